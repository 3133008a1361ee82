// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence of session and resource state between runs.
//!
//! Snapshots are keyed; the client always uses [`STATE_KEY`]. Tokens stay
//! wrapped in [`SecretString`] at runtime and are only written in plain form
//! by the file-backed store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kubeportal_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::error::StoreError;
use crate::model::{ApiManifest, ApprovingAdmin, Group, Namespace, ServiceAccount, User, WebApp};
use crate::session::{Session, SessionStatus};
use crate::sync::ResourcesSnapshot;

pub const STATE_KEY: &str = "kubeportal";

#[derive(Debug, Clone)]
pub struct StateSnapshot {
	pub session: SessionSnapshot,
	pub resources: ResourcesSnapshot,
	pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
	pub status: SessionStatus,
	pub manifest: Option<ApiManifest>,
	pub access_token: SecretString,
	pub refresh_token: SecretString,
	pub access_token_refresh_url: Option<Url>,
	pub user_url: Option<Url>,
	pub approval_url: Option<Url>,
	pub current_user: Option<User>,
	pub current_service_account: Option<ServiceAccount>,
	pub current_namespace: Option<Namespace>,
	pub webapps: Vec<WebApp>,
	pub groups: Vec<Group>,
	pub approving_admins: Vec<ApprovingAdmin>,
}

impl From<&Session> for SessionSnapshot {
	fn from(session: &Session) -> Self {
		Self {
			status: session.status,
			manifest: session.manifest.clone(),
			access_token: session.access_token.clone(),
			refresh_token: session.refresh_token.clone(),
			access_token_refresh_url: session.access_token_refresh_url.clone(),
			user_url: session.user_url.clone(),
			approval_url: session.approval_url.clone(),
			current_user: session.current_user.clone(),
			current_service_account: session.current_service_account.clone(),
			current_namespace: session.current_namespace.clone(),
			webapps: session.webapps.clone(),
			groups: session.groups.clone(),
			approving_admins: session.approving_admins.clone(),
		}
	}
}

impl SessionSnapshot {
	/// Overwrites every field of `session`.
	pub(crate) fn apply(self, session: &mut Session) {
		*session = Session {
			manifest: self.manifest,
			status: self.status,
			access_token: self.access_token,
			refresh_token: self.refresh_token,
			access_token_refresh_url: self.access_token_refresh_url,
			user_url: self.user_url,
			approval_url: self.approval_url,
			current_user: self.current_user,
			current_service_account: self.current_service_account,
			current_namespace: self.current_namespace,
			webapps: self.webapps,
			groups: self.groups,
			approving_admins: self.approving_admins,
		};
	}
}

/// On-disk form of [`SessionSnapshot`]; tokens in plain text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSession {
	#[serde(default)]
	pub status: SessionStatus,
	#[serde(default)]
	pub manifest: Option<ApiManifest>,
	#[serde(default)]
	pub access_token: String,
	#[serde(default)]
	pub refresh_token: String,
	#[serde(default)]
	pub access_token_refresh_url: Option<Url>,
	#[serde(default)]
	pub user_url: Option<Url>,
	#[serde(default)]
	pub approval_url: Option<Url>,
	#[serde(default)]
	pub current_user: Option<User>,
	#[serde(default)]
	pub current_service_account: Option<ServiceAccount>,
	#[serde(default)]
	pub current_namespace: Option<Namespace>,
	#[serde(default)]
	pub webapps: Vec<WebApp>,
	#[serde(default)]
	pub groups: Vec<Group>,
	#[serde(default)]
	pub approving_admins: Vec<ApprovingAdmin>,
}

impl From<&SessionSnapshot> for PersistedSession {
	fn from(snapshot: &SessionSnapshot) -> Self {
		Self {
			status: snapshot.status,
			manifest: snapshot.manifest.clone(),
			access_token: snapshot.access_token.expose().clone(),
			refresh_token: snapshot.refresh_token.expose().clone(),
			access_token_refresh_url: snapshot.access_token_refresh_url.clone(),
			user_url: snapshot.user_url.clone(),
			approval_url: snapshot.approval_url.clone(),
			current_user: snapshot.current_user.clone(),
			current_service_account: snapshot.current_service_account.clone(),
			current_namespace: snapshot.current_namespace.clone(),
			webapps: snapshot.webapps.clone(),
			groups: snapshot.groups.clone(),
			approving_admins: snapshot.approving_admins.clone(),
		}
	}
}

impl From<PersistedSession> for SessionSnapshot {
	fn from(persisted: PersistedSession) -> Self {
		Self {
			status: persisted.status,
			manifest: persisted.manifest,
			access_token: SecretString::new(persisted.access_token),
			refresh_token: SecretString::new(persisted.refresh_token),
			access_token_refresh_url: persisted.access_token_refresh_url,
			user_url: persisted.user_url,
			approval_url: persisted.approval_url,
			current_user: persisted.current_user,
			current_service_account: persisted.current_service_account,
			current_namespace: persisted.current_namespace,
			webapps: persisted.webapps,
			groups: persisted.groups,
			approving_admins: persisted.approving_admins,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
	pub session: PersistedSession,
	#[serde(default)]
	pub resources: ResourcesSnapshot,
	pub saved_at: DateTime<Utc>,
}

impl From<&StateSnapshot> for PersistedState {
	fn from(snapshot: &StateSnapshot) -> Self {
		Self {
			session: PersistedSession::from(&snapshot.session),
			resources: snapshot.resources.clone(),
			saved_at: snapshot.saved_at,
		}
	}
}

impl From<PersistedState> for StateSnapshot {
	fn from(persisted: PersistedState) -> Self {
		Self {
			session: SessionSnapshot::from(persisted.session),
			resources: persisted.resources,
			saved_at: persisted.saved_at,
		}
	}
}

/// On-disk store format.
pub type PersistedStateStore = HashMap<String, PersistedState>;

#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
	async fn load(&self, key: &str) -> Result<Option<StateSnapshot>, StoreError>;

	async fn save(&self, key: &str, snapshot: &StateSnapshot) -> Result<(), StoreError>;

	async fn delete(&self, key: &str) -> Result<(), StoreError>;

	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		Ok(self.load(key).await?.is_some())
	}
}

/// JSON file store, written atomically with 0600 permissions on Unix.
#[derive(Debug, Clone)]
pub struct FileStateStore {
	path: PathBuf,
}

impl FileStateStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn read_store(&self) -> Result<PersistedStateStore, StoreError> {
		if !self.path.exists() {
			return Ok(HashMap::new());
		}

		let contents = fs::read_to_string(&self.path).await?;
		Ok(serde_json::from_str(&contents)?)
	}

	async fn write_store(&self, store: &PersistedStateStore) -> Result<(), StoreError> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent).await?;
		}

		let contents = serde_json::to_string_pretty(store)?;

		let temp_path = self.path.with_extension("tmp");
		let mut file = fs::File::create(&temp_path).await?;
		file.write_all(contents.as_bytes()).await?;
		file.sync_all().await?;
		drop(file);

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let perms = std::fs::Permissions::from_mode(0o600);
			if let Err(e) = std::fs::set_permissions(&temp_path, perms) {
				warn!(path = ?temp_path, error = %e, "failed to restrict state file permissions");
			}
		}

		fs::rename(&temp_path, &self.path).await?;

		debug!(path = ?self.path, "state store written");
		Ok(())
	}
}

#[async_trait]
impl StateStore for FileStateStore {
	async fn load(&self, key: &str) -> Result<Option<StateSnapshot>, StoreError> {
		let mut store = self.read_store().await?;
		Ok(store.remove(key).map(StateSnapshot::from))
	}

	async fn save(&self, key: &str, snapshot: &StateSnapshot) -> Result<(), StoreError> {
		let mut store = self.read_store().await?;
		store.insert(key.to_string(), PersistedState::from(snapshot));
		self.write_store(&store).await
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		let mut store = self.read_store().await?;
		if store.remove(key).is_none() {
			return Ok(());
		}
		self.write_store(&store).await
	}
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
	snapshots: tokio::sync::RwLock<HashMap<String, StateSnapshot>>,
}

impl MemoryStateStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StateStore for MemoryStateStore {
	async fn load(&self, key: &str) -> Result<Option<StateSnapshot>, StoreError> {
		Ok(self.snapshots.read().await.get(key).cloned())
	}

	async fn save(&self, key: &str, snapshot: &StateSnapshot) -> Result<(), StoreError> {
		self
			.snapshots
			.write()
			.await
			.insert(key.to_string(), snapshot.clone());
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StoreError> {
		self.snapshots.write().await.remove(key);
		Ok(())
	}
}
