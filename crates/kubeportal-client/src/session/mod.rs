// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session lifecycle: bootstrap, login, approval gating, logout.
//!
//! After a successful login the manager fetches the user, follows the first
//! service account to its namespace and hands the namespace's collection
//! links to the synchronizers. Users whose access is not approved yet get no
//! links at all.

mod state;

pub use state::{Session, SessionStatus, SharedSession};

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use kubeportal_common_secret::SecretString;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{ApiError, SessionError};
use crate::http::{ApiClient, ApiRequest};
use crate::model::{
	ApiManifest, ApprovalInfo, ApprovingAdmin, Group, LoginResponse, Namespace, ServiceAccount,
	User, WebApp,
};
use crate::store::{SessionSnapshot, StateSnapshot, StateStore, STATE_KEY};
use crate::sync::{NewsRecord, ResourceKind, SyncReport, Synchronizer, Synchronizers};

#[derive(Debug, Clone)]
pub enum Credentials {
	Password {
		username: String,
		password: SecretString,
	},
	/// A token issued by the external identity provider.
	OAuth { access_token: SecretString },
}

impl Credentials {
	pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self::Password {
			username: username.into(),
			password: SecretString::new(password.into()),
		}
	}

	pub fn oauth(access_token: impl Into<String>) -> Self {
		Self::OAuth {
			access_token: SecretString::new(access_token.into()),
		}
	}

	fn flavor(&self) -> &'static str {
		match self {
			Credentials::Password { .. } => "password",
			Credentials::OAuth { .. } => "oauth",
		}
	}

	fn login_link(&self, manifest: &ApiManifest) -> Result<String, ApiError> {
		let (link, name) = match self {
			Credentials::Password { .. } => (&manifest.login_url, "login_url"),
			Credentials::OAuth { .. } => (&manifest.login_google_url, "login_google_url"),
		};
		link.clone().ok_or(ApiError::MissingLink(name))
	}

	fn body(&self) -> Value {
		match self {
			Credentials::Password { username, password } => json!({
				"username": username,
				"password": password.expose(),
			}),
			Credentials::OAuth { access_token } => json!({
				"access_token": access_token.expose(),
			}),
		}
	}
}

/// Owns the client handle and the synchronizers it feeds.
#[derive(Debug, Clone)]
pub struct SessionManager {
	api: ApiClient,
	resources: Synchronizers,
	store: Option<Arc<dyn StateStore>>,
}

impl SessionManager {
	pub fn new(api: ApiClient) -> Self {
		Self {
			resources: Synchronizers::new(api.clone()),
			api,
			store: None,
		}
	}

	/// Persists state to `store` after login, approval requests, user
	/// updates and every run started through [`Self::populate`],
	/// [`Self::request_news`] or [`Self::request_storageclasses`]. Runs
	/// started on a synchronizer directly are saved by the next of those or
	/// by an explicit [`Self::persist`].
	pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn api(&self) -> &ApiClient {
		&self.api
	}

	pub fn resources(&self) -> &Synchronizers {
		&self.resources
	}

	pub async fn status(&self) -> SessionStatus {
		self.api.session().read().await.status()
	}

	pub async fn current_user(&self) -> Option<User> {
		self.api.session().read().await.current_user().cloned()
	}

	/// Fetches the manifest without credentials and stores the CSRF token
	/// and login/logout links.
	#[instrument(skip_all, fields(url = %self.api.manifest_url()))]
	pub async fn bootstrap(&self) -> Result<ApiManifest, SessionError> {
		let manifest: ApiManifest = self.api.get_json(self.api.manifest_url().clone()).await?;
		if manifest.csrf_token.as_deref().map_or(true, str::is_empty) {
			warn!("manifest carries no CSRF token, requests will stay unauthenticated");
		}
		self.api.session().write().await.set_manifest(manifest.clone());
		info!(branding = manifest.branding.as_deref().unwrap_or(""), "API manifest loaded");
		Ok(manifest)
	}

	/// Logs in, fetches the user and runs [`Self::after_login`]. Whatever the
	/// previous user left behind is dropped first; any failure returns the
	/// session to anonymous.
	#[instrument(skip_all, fields(flavor = credentials.flavor()))]
	pub async fn login(&self, credentials: Credentials) -> Result<SessionStatus, SessionError> {
		let link = {
			let session = self.api.session().read().await;
			let manifest = session.manifest().ok_or(SessionError::NotBootstrapped)?;
			credentials.login_link(manifest)?
		};
		let login_url = self.api.resolve_link(&link)?;

		self.reset_local().await;
		self.set_status(SessionStatus::Authenticating).await;

		match self.authenticate(login_url, &credentials).await {
			Ok(status) => {
				info!(status = status.as_str(), "login complete");
				self.persist_quietly().await;
				Ok(status)
			}
			Err(e) => {
				warn!(error = %e, "login failed");
				self.reset_local().await;
				Err(e)
			}
		}
	}

	async fn authenticate(
		&self,
		login_url: Url,
		credentials: &Credentials,
	) -> Result<SessionStatus, SessionError> {
		let response = self
			.api
			.post(login_url, credentials.body())
			.await
			.map_err(|e| match e {
				ApiError::Status { status, .. }
					if matches!(
						status,
						StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
					) =>
				{
					SessionError::LoginRejected(format!("server answered {status}"))
				}
				other => other.into(),
			})?;
		let login: LoginResponse = response.json()?;
		self.install_login(login).await?;
		self.request_current_user().await?;
		self.after_login().await
	}

	async fn install_login(&self, login: LoginResponse) -> Result<(), SessionError> {
		let user_url = self.api.resolve_link(&login.user_url)?;
		let approval_url = self.optional_link(login.user_approval_url.as_deref(), "user_approval_url");
		let refresh_url = self.optional_link(
			login.access_token_refresh_url.as_deref(),
			"access_token_refresh_url",
		);
		if refresh_url.is_none() {
			debug!("no refresh endpoint offered, expired tokens will end the session");
		}

		{
			let mut session = self.api.session().write().await;
			session.install_tokens(
				SecretString::new(login.access_token),
				SecretString::new(login.refresh_token.unwrap_or_default()),
			);
			session.user_url = Some(user_url);
			session.approval_url = approval_url;
			session.set_access_token_refresh_url(refresh_url);
			session.status = SessionStatus::Authenticated;
		}

		if let Some(url) = self.optional_link(login.news_url.as_deref(), "news_url") {
			self.resources.news.set_news_url(url).await;
		}
		if let Some(url) = self.optional_link(login.infos_url.as_deref(), "infos_url") {
			self.resources.cluster_info.set_collection_link(url).await;
		}
		if let Some(url) = self.optional_link(login.storageclasses_url.as_deref(), "storageclasses_url") {
			self.resources.pvcs.set_storageclasses_url(url).await;
		}
		Ok(())
	}

	/// Drops the namespace-derived links, then distributes the current
	/// namespace's links if the user is approved.
	#[instrument(skip_all)]
	pub async fn after_login(&self) -> Result<SessionStatus, SessionError> {
		let user = self
			.current_user()
			.await
			.ok_or(SessionError::NotAuthenticated)?;

		self.reset_namespace_links().await;
		{
			let mut session = self.api.session().write().await;
			session.current_service_account = None;
			session.current_namespace = None;
		}

		if !user.is_approved() {
			info!(state = ?user.state, "access not approved, no collection links distributed");
			self.set_status(SessionStatus::AccessPending).await;
			return Ok(SessionStatus::AccessPending);
		}

		let (service_account, namespace_link) = match user.serviceaccount_urls.first() {
			Some(link) => {
				let account: ServiceAccount = self.fetch(link).await?;
				let namespace = account.namespace.clone();
				(Some(account), namespace)
			}
			None => match user.namespace_urls.first() {
				Some(link) => (None, link.clone()),
				None => {
					warn!("approved user has neither a service account nor a namespace");
					self.set_status(SessionStatus::AccessApproved).await;
					return Ok(SessionStatus::AccessApproved);
				}
			},
		};

		let namespace: Namespace = self.fetch(&namespace_link).await?;
		self.distribute_links(&namespace).await;

		{
			let mut session = self.api.session().write().await;
			session.current_service_account = service_account;
			session.current_namespace = Some(namespace);
			session.status = SessionStatus::AccessApproved;
		}
		Ok(SessionStatus::AccessApproved)
	}

	async fn distribute_links(&self, namespace: &Namespace) {
		let r = &self.resources;
		if let Some(url) = self.optional_link(namespace.pods_url.as_deref(), "pods_url") {
			r.pods.set_collection_link(url).await;
		}
		if let Some(url) = self.optional_link(namespace.deployments_url.as_deref(), "deployments_url") {
			r.deployments.set_collection_link(url).await;
		}
		if let Some(url) = self.optional_link(namespace.services_url.as_deref(), "services_url") {
			r.services.set_collection_link(url).await;
		}
		if let Some(url) = self.optional_link(namespace.ingresses_url.as_deref(), "ingresses_url") {
			r.ingresses.set_collection_link(url).await;
		}
		if let Some(url) = self.optional_link(
			namespace.persistentvolumeclaims_url.as_deref(),
			"persistentvolumeclaims_url",
		) {
			r.pvcs.set_collection_link(url).await;
		}
		debug!(namespace = namespace.name.as_deref().unwrap_or(""), "collection links distributed");
	}

	/// Posts the logout without waiting for it and resets all local state.
	/// The returned handle resolves once the server has answered.
	#[instrument(skip_all)]
	pub async fn logout(&self) -> Result<Option<JoinHandle<()>>, SessionError> {
		let logout_link = {
			let session = self.api.session().read().await;
			session.manifest().and_then(|m| m.logout_url.clone())
		};
		let pending = match self.optional_link(logout_link.as_deref(), "logout_url") {
			Some(url) => Some(self.api.send_detached(ApiRequest::post(url, json!({}))).await),
			None => None,
		};

		self.reset_local().await;
		if let Some(store) = &self.store {
			store.delete(STATE_KEY).await?;
		}

		info!("logged out");
		Ok(pending)
	}

	/// Asks each admin to approve the user. Returns how many requests the
	/// server accepted; every accepted one refreshes the current user.
	#[instrument(skip_all, fields(admins = admin_urls.len()))]
	pub async fn request_access_approval(&self, admin_urls: &[String]) -> Result<usize, SessionError> {
		let approval_url = self
			.api
			.session()
			.read()
			.await
			.approval_url()
			.cloned()
			.ok_or(ApiError::MissingLink("user_approval_url"))?;

		let outcomes = join_all(admin_urls.iter().map(|admin| {
			let url = approval_url.clone();
			async move {
				match self
					.api
					.post(url, json!({ "approving_admin_url": admin }))
					.await
				{
					Ok(_) => {
						if let Err(e) = self.request_current_user().await {
							warn!(error = %e, "user refresh after approval request failed");
						}
						true
					}
					Err(e) => {
						warn!(admin = %admin, error = %e, "approval request failed");
						false
					}
				}
			}
		}))
		.await;

		let accepted = outcomes.into_iter().filter(|ok| *ok).count();
		info!(accepted, "approval requests sent");
		self.persist_quietly().await;
		Ok(accepted)
	}

	pub async fn request_current_user(&self) -> Result<User, SessionError> {
		let url = self
			.api
			.session()
			.read()
			.await
			.user_url()
			.cloned()
			.ok_or(SessionError::NotAuthenticated)?;
		let user: User = self.api.get_json(url).await?;
		self.api.session().write().await.current_user = Some(user.clone());
		Ok(user)
	}

	/// PATCHes the user resource, then re-reads it.
	#[instrument(skip_all)]
	pub async fn update_user(&self, patch: Value) -> Result<User, SessionError> {
		let url = self
			.api
			.session()
			.read()
			.await
			.user_url()
			.cloned()
			.ok_or(SessionError::NotAuthenticated)?;
		self.api.patch(url, patch).await?;
		let user = self.request_current_user().await?;
		self.persist_quietly().await;
		Ok(user)
	}

	/// Fetches the user's web applications with link templates filled in.
	pub async fn request_webapps(&self) -> Result<Vec<WebApp>, SessionError> {
		let (links, namespace, service_account) = {
			let session = self.api.session().read().await;
			let user = session.current_user().ok_or(SessionError::NotAuthenticated)?;
			(
				user.webapp_urls.clone(),
				session
					.current_namespace()
					.and_then(|ns| ns.name.clone())
					.unwrap_or_default(),
				session
					.current_service_account()
					.and_then(|sa| sa.name.clone())
					.unwrap_or_default(),
			)
		};

		let mut webapps: Vec<WebApp> = self.fetch_all(&links, "webapp").await;
		for app in &mut webapps {
			app.render_link(&namespace, &service_account);
		}
		self.api.session().write().await.webapps = webapps.clone();
		Ok(webapps)
	}

	pub async fn request_groups(&self) -> Result<Vec<Group>, SessionError> {
		let links = self
			.current_user()
			.await
			.ok_or(SessionError::NotAuthenticated)?
			.group_urls;
		let groups: Vec<Group> = self.fetch_all(&links, "group").await;
		self.api.session().write().await.groups = groups.clone();
		Ok(groups)
	}

	/// Lists the admins that may approve this user.
	pub async fn request_approving_admins(&self) -> Result<Vec<ApprovingAdmin>, SessionError> {
		let url = self
			.api
			.session()
			.read()
			.await
			.approval_url()
			.cloned()
			.ok_or(ApiError::MissingLink("user_approval_url"))?;
		let info: ApprovalInfo = self.api.get_json(url).await?;

		let users: Vec<Option<User>> = join_all(
			info
				.approving_admin_urls
				.iter()
				.map(|link| self.fetch_optional::<User>(link, "approving admin")),
		)
		.await;
		let admins: Vec<ApprovingAdmin> = info
			.approving_admin_urls
			.into_iter()
			.zip(users)
			.filter_map(|(url, user)| user.map(|user| ApprovingAdmin { url, user }))
			.collect();

		self.api.session().write().await.approving_admins = admins.clone();
		Ok(admins)
	}

	/// Repopulates one of this manager's synchronizers and saves the state
	/// once the run settles.
	pub async fn populate<K: ResourceKind>(
		&self,
		sync: &Synchronizer<K>,
	) -> Result<SyncReport, SessionError> {
		let report = sync.request_all().await?.settled().await?;
		if report.superseded {
			debug!(kind = K::NAME, "run superseded, state left for the newer run");
		} else {
			self.persist_quietly().await;
		}
		Ok(report)
	}

	pub async fn request_news(&self) -> Result<Vec<NewsRecord>, SessionError> {
		let news = self.resources.news.request_news().await?;
		self.persist_quietly().await;
		Ok(news)
	}

	pub async fn request_storageclasses(&self) -> Result<Vec<String>, SessionError> {
		let classes = self.resources.pvcs.request_storageclasses().await?;
		self.persist_quietly().await;
		Ok(classes)
	}

	pub async fn snapshot(&self) -> StateSnapshot {
		let session = SessionSnapshot::from(&*self.api.session().read().await);
		StateSnapshot {
			session,
			resources: self.resources.snapshot().await,
			saved_at: Utc::now(),
		}
	}

	pub async fn restore_snapshot(&self, snapshot: StateSnapshot) {
		snapshot.session.apply(&mut *self.api.session().write().await);
		self.resources.restore(snapshot.resources).await;
	}

	/// Loads the persisted state, if any. Returns whether a snapshot was found.
	pub async fn restore(&self) -> Result<bool, SessionError> {
		let Some(store) = &self.store else {
			return Ok(false);
		};
		match store.load(STATE_KEY).await? {
			Some(snapshot) => {
				debug!(saved_at = %snapshot.saved_at, "restoring persisted state");
				self.restore_snapshot(snapshot).await;
				Ok(true)
			}
			None => Ok(false),
		}
	}

	pub async fn persist(&self) -> Result<(), SessionError> {
		if let Some(store) = &self.store {
			store.save(STATE_KEY, &self.snapshot().await).await?;
		}
		Ok(())
	}

	async fn persist_quietly(&self) {
		if let Err(e) = self.persist().await {
			warn!(error = %e, "failed to persist state");
		}
	}

	/// Forgets every user-bound value. The manifest survives.
	async fn reset_local(&self) {
		self.api.session().write().await.clear();
		self.resources.reset_all().await;
	}

	/// Links that come from the namespace, as opposed to the login response.
	async fn reset_namespace_links(&self) {
		let r = &self.resources;
		r.pods.clear_collection().await;
		r.deployments.clear_collection().await;
		r.services.clear_collection().await;
		r.ingresses.clear_collection().await;
		r.pvcs.clear_collection().await;
	}

	async fn set_status(&self, status: SessionStatus) {
		self.api.session().write().await.status = status;
	}

	fn optional_link(&self, link: Option<&str>, name: &'static str) -> Option<Url> {
		let link = link.filter(|l| !l.trim().is_empty())?;
		match self.api.resolve_link(link) {
			Ok(url) => Some(url),
			Err(e) => {
				warn!(link = name, error = %e, "ignoring unusable link");
				None
			}
		}
	}

	async fn fetch<T: DeserializeOwned>(&self, link: &str) -> Result<T, ApiError> {
		let url = self.api.resolve_link(link)?;
		self.api.get_json(url).await
	}

	async fn fetch_optional<T: DeserializeOwned>(&self, link: &str, what: &'static str) -> Option<T> {
		match self.fetch(link).await {
			Ok(value) => Some(value),
			Err(e) => {
				warn!(link, what, error = %e, "fetch failed, skipping");
				None
			}
		}
	}

	/// Fetches every link concurrently, keeping input order and dropping
	/// failures.
	async fn fetch_all<T: DeserializeOwned>(&self, links: &[String], what: &'static str) -> Vec<T> {
		join_all(links.iter().map(|link| self.fetch_optional::<T>(link, what)))
			.await
			.into_iter()
			.flatten()
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn credentials_pick_matching_login_link() {
		let manifest = ApiManifest {
			login_url: Some("/api/v2/login/".to_string()),
			login_google_url: None,
			..Default::default()
		};

		assert_eq!(
			Credentials::password("ada", "pw").login_link(&manifest).unwrap(),
			"/api/v2/login/"
		);
		assert!(matches!(
			Credentials::oauth("token").login_link(&manifest),
			Err(ApiError::MissingLink("login_google_url"))
		));
	}

	#[test]
	fn credential_bodies() {
		assert_eq!(
			Credentials::password("ada", "pw").body(),
			json!({ "username": "ada", "password": "pw" })
		);
		assert_eq!(
			Credentials::oauth("tok").body(),
			json!({ "access_token": "tok" })
		);
	}

	#[test]
	fn credentials_debug_is_redacted() {
		let rendered = format!("{:?}", Credentials::password("ada", "hunter2"));
		assert!(rendered.contains("ada"));
		assert!(!rendered.contains("hunter2"));
	}
}
