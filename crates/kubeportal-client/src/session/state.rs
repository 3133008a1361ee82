// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use kubeportal_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::model::{ApiManifest, ApprovingAdmin, Group, Namespace, ServiceAccount, User, WebApp};

/// The one live session, shared by the HTTP client and the session manager.
pub type SharedSession = Arc<RwLock<Session>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	#[default]
	Anonymous,
	Authenticating,
	Authenticated,
	AccessPending,
	AccessApproved,
}

impl SessionStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			SessionStatus::Anonymous => "anonymous",
			SessionStatus::Authenticating => "authenticating",
			SessionStatus::Authenticated => "authenticated",
			SessionStatus::AccessPending => "access_pending",
			SessionStatus::AccessApproved => "access_approved",
		}
	}
}

#[derive(Debug, Default)]
pub struct Session {
	pub(crate) manifest: Option<ApiManifest>,
	pub(crate) status: SessionStatus,
	pub(crate) access_token: SecretString,
	pub(crate) refresh_token: SecretString,
	pub(crate) access_token_refresh_url: Option<Url>,
	pub(crate) user_url: Option<Url>,
	pub(crate) approval_url: Option<Url>,
	pub(crate) current_user: Option<User>,
	pub(crate) current_service_account: Option<ServiceAccount>,
	pub(crate) current_namespace: Option<Namespace>,
	pub(crate) webapps: Vec<WebApp>,
	pub(crate) groups: Vec<Group>,
	pub(crate) approving_admins: Vec<ApprovingAdmin>,
}

impl Session {
	pub fn new_shared() -> SharedSession {
		Arc::new(RwLock::new(Session::default()))
	}

	pub fn status(&self) -> SessionStatus {
		self.status
	}

	pub fn manifest(&self) -> Option<&ApiManifest> {
		self.manifest.as_ref()
	}

	pub fn csrf_token(&self) -> Option<&str> {
		self
			.manifest
			.as_ref()
			.and_then(|m| m.csrf_token.as_deref())
			.filter(|t| !t.is_empty())
	}

	/// True once an access token is held and the CSRF token is known.
	pub fn is_authenticated(&self) -> bool {
		!self.access_token.is_empty() && self.csrf_token().is_some()
	}

	pub fn access_token(&self) -> &SecretString {
		&self.access_token
	}

	pub fn refresh_token(&self) -> &SecretString {
		&self.refresh_token
	}

	pub fn access_token_refresh_url(&self) -> Option<&Url> {
		self.access_token_refresh_url.as_ref()
	}

	pub(crate) fn can_refresh(&self) -> bool {
		self.access_token_refresh_url.is_some() && !self.refresh_token.is_empty()
	}

	pub fn user_url(&self) -> Option<&Url> {
		self.user_url.as_ref()
	}

	pub fn approval_url(&self) -> Option<&Url> {
		self.approval_url.as_ref()
	}

	pub fn current_user(&self) -> Option<&User> {
		self.current_user.as_ref()
	}

	pub fn current_service_account(&self) -> Option<&ServiceAccount> {
		self.current_service_account.as_ref()
	}

	pub fn current_namespace(&self) -> Option<&Namespace> {
		self.current_namespace.as_ref()
	}

	pub fn webapps(&self) -> &[WebApp] {
		&self.webapps
	}

	pub fn groups(&self) -> &[Group] {
		&self.groups
	}

	pub fn approving_admins(&self) -> &[ApprovingAdmin] {
		&self.approving_admins
	}

	pub fn set_manifest(&mut self, manifest: ApiManifest) {
		self.manifest = Some(manifest);
	}

	/// Installs a token pair in one step so readers never see half of it.
	pub fn install_tokens(&mut self, access: SecretString, refresh: SecretString) {
		self.access_token = access;
		self.refresh_token = refresh;
	}

	pub fn set_access_token_refresh_url(&mut self, url: Option<Url>) {
		self.access_token_refresh_url = url;
	}

	pub(crate) fn install_refreshed(&mut self, access: String, refresh: Option<String>) {
		self.access_token = SecretString::new(access);
		if let Some(refresh) = refresh.filter(|r| !r.is_empty()) {
			self.refresh_token = SecretString::new(refresh);
		}
	}

	/// Drops everything tied to the signed-in user. The manifest is kept so a
	/// new login does not need another bootstrap.
	pub(crate) fn clear(&mut self) {
		let manifest = self.manifest.take();
		*self = Session {
			manifest,
			..Session::default()
		};
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn manifest_with_csrf(csrf: &str) -> ApiManifest {
		ApiManifest {
			csrf_token: Some(csrf.to_string()),
			..Default::default()
		}
	}

	#[test]
	fn authenticated_needs_token_and_csrf() {
		let mut session = Session::default();
		assert!(!session.is_authenticated());

		session.install_tokens("T1".into(), "R1".into());
		assert!(!session.is_authenticated());

		session.set_manifest(manifest_with_csrf("abc"));
		assert!(session.is_authenticated());

		session.set_manifest(manifest_with_csrf(""));
		assert!(!session.is_authenticated());
	}

	#[test]
	fn refresh_keeps_refresh_token_unless_rotated() {
		let mut session = Session::default();
		session.install_tokens("T1".into(), "R1".into());

		session.install_refreshed("T2".to_string(), None);
		assert_eq!(session.access_token().expose(), "T2");
		assert_eq!(session.refresh_token().expose(), "R1");

		session.install_refreshed("T3".to_string(), Some("R2".to_string()));
		assert_eq!(session.refresh_token().expose(), "R2");
	}

	#[test]
	fn clear_keeps_only_the_manifest() {
		let mut session = Session::default();
		session.set_manifest(manifest_with_csrf("abc"));
		session.install_tokens("T1".into(), "R1".into());
		session.status = SessionStatus::AccessApproved;
		session.user_url = Some(Url::parse("http://portal.example/users/1").unwrap());

		session.clear();

		assert_eq!(session.status(), SessionStatus::Anonymous);
		assert!(session.access_token().is_empty());
		assert!(session.user_url().is_none());
		assert_eq!(session.csrf_token(), Some("abc"));
	}

	#[test]
	fn debug_output_redacts_tokens() {
		let mut session = Session::default();
		session.install_tokens("super-secret-access".into(), "super-secret-refresh".into());
		let rendered = format!("{session:?}");
		assert!(!rendered.contains("super-secret"));
	}
}
