// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Payloads exchanged with the portal API outside of the resource collections.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unauthenticated entry point served at `/api/<version>/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiManifest {
	#[serde(default)]
	pub branding: Option<String>,
	#[serde(default)]
	pub csrf_token: Option<String>,
	#[serde(default)]
	pub login_url: Option<String>,
	#[serde(default)]
	pub login_google_url: Option<String>,
	#[serde(default)]
	pub logout_url: Option<String>,
	#[serde(default)]
	pub use_elastic: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
	pub access_token: String,
	#[serde(default)]
	pub refresh_token: Option<String>,
	pub user_url: String,
	#[serde(default)]
	pub user_approval_url: Option<String>,
	#[serde(default)]
	pub access_token_refresh_url: Option<String>,
	#[serde(default)]
	pub news_url: Option<String>,
	#[serde(default)]
	pub infos_url: Option<String>,
	#[serde(default)]
	pub storageclasses_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshResponse {
	pub access: String,
	/// Present when the server rotates refresh tokens.
	#[serde(default)]
	pub refresh: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserState {
	New,
	AccessRequested,
	AccessRejected,
	AccessApproved,
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
	pub state: UserState,
	#[serde(default)]
	pub username: Option<String>,
	#[serde(default)]
	pub firstname: Option<String>,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub primary_email: Option<String>,
	#[serde(default)]
	pub webapp_urls: Vec<String>,
	#[serde(default)]
	pub group_urls: Vec<String>,
	#[serde(default)]
	pub serviceaccount_urls: Vec<String>,
	#[serde(default)]
	pub namespace_urls: Vec<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl User {
	pub fn is_approved(&self) -> bool {
		self.state == UserState::AccessApproved
	}

	pub fn display_name(&self) -> String {
		match (&self.firstname, &self.name, &self.username) {
			(Some(first), Some(last), _) => format!("{first} {last}"),
			(_, _, Some(username)) => username.clone(),
			(Some(first), None, None) => first.clone(),
			(None, Some(last), None) => last.clone(),
			(None, None, None) => String::new(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccount {
	#[serde(default)]
	pub name: Option<String>,
	/// Link to the namespace resource.
	pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub pods_url: Option<String>,
	#[serde(default)]
	pub deployments_url: Option<String>,
	#[serde(default)]
	pub services_url: Option<String>,
	#[serde(default)]
	pub ingresses_url: Option<String>,
	#[serde(default)]
	pub persistentvolumeclaims_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebApp {
	#[serde(default)]
	pub link_name: Option<String>,
	#[serde(default)]
	pub link_url: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl WebApp {
	/// Substitutes `{{namespace}}` and `{{serviceaccount}}` in `link_url`.
	pub fn render_link(&mut self, namespace: &str, service_account: &str) {
		if let Some(link) = self.link_url.as_mut() {
			*link = link
				.replace("{{namespace}}", namespace)
				.replace("{{serviceaccount}}", service_account);
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ApprovalInfo {
	#[serde(default)]
	pub approving_admin_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovingAdmin {
	/// The admin's resource link, posted back when requesting approval.
	pub url: String,
	pub user: User,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct StorageClassList {
	#[serde(default)]
	pub classes: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn unknown_user_state_does_not_fail_decoding() {
		let user: User = serde_json::from_value(json!({ "state": "SUSPENDED" })).unwrap();
		assert_eq!(user.state, UserState::Unknown);
		assert!(!user.is_approved());
		assert!(user.serviceaccount_urls.is_empty());
	}

	#[test]
	fn user_keeps_unmodelled_fields() {
		let user: User = serde_json::from_value(json!({
			"state": "ACCESS_APPROVED",
			"firstname": "Ada",
			"name": "Lovelace",
			"alt_mails": ["ada@example.org"],
		}))
		.unwrap();
		assert!(user.is_approved());
		assert_eq!(user.display_name(), "Ada Lovelace");
		assert_eq!(user.extra["alt_mails"], json!(["ada@example.org"]));
	}

	#[test]
	fn webapp_link_templates_are_substituted() {
		let mut app: WebApp = serde_json::from_value(json!({
			"link_name": "Dashboard",
			"link_url": "https://dash.example/{{namespace}}/{{serviceaccount}}?ns={{namespace}}",
		}))
		.unwrap();
		app.render_link("team-a", "default");
		assert_eq!(
			app.link_url.as_deref(),
			Some("https://dash.example/team-a/default?ns=team-a")
		);
	}

	#[test]
	fn login_response_tolerates_missing_optional_links() {
		let login: LoginResponse = serde_json::from_value(json!({
			"access_token": "T1",
			"refresh_token": "R1",
			"user_url": "/users/1",
		}))
		.unwrap();
		assert_eq!(login.refresh_token.as_deref(), Some("R1"));
		assert!(login.access_token_refresh_url.is_none());
	}
}
