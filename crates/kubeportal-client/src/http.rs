// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authenticated access to the portal API.
//!
//! Every request carries the CSRF token once the manifest is known and a
//! bearer token unless it targets the manifest root or a login-family
//! endpoint. A 401 triggers at most one token refresh across all concurrent
//! callers, after which the failed request is replayed once.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use kubeportal_client_config::ClientConfig;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ApiError;
use crate::model::RefreshResponse;
use crate::session::{Session, SharedSession};

pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Format: `kubeportal-client/{version}/{os}-{arch}`
pub fn user_agent() -> String {
	format!(
		"kubeportal-client/{}/{}-{}",
		env!("CARGO_PKG_VERSION"),
		std::env::consts::OS,
		std::env::consts::ARCH
	)
}

/// Client builder with the standard User-Agent applied.
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// A request kept in replayable form.
#[derive(Clone)]
pub struct ApiRequest {
	pub method: Method,
	pub url: Url,
	pub body: Option<Value>,
	pub query: Vec<(String, String)>,
}

impl ApiRequest {
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			body: None,
			query: Vec::new(),
		}
	}

	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	pub fn post(url: Url, body: Value) -> Self {
		Self::new(Method::POST, url).with_body(body)
	}

	pub fn patch(url: Url, body: Value) -> Self {
		Self::new(Method::PATCH, url).with_body(body)
	}

	pub fn with_body(mut self, body: Value) -> Self {
		self.body = Some(body);
		self
	}

	pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
		self.query.push((key.into(), value.to_string()));
		self
	}
}

// Bodies can carry credentials, so only the target is printed.
impl fmt::Debug for ApiRequest {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ApiRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("has_body", &self.body.is_some())
			.field("query", &self.query)
			.finish()
	}
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
	pub status: StatusCode,
	pub url: Url,
	pub body: Bytes,
}

impl ApiResponse {
	pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
		serde_json::from_slice(&self.body).map_err(|source| ApiError::Decode {
			url: self.url.to_string(),
			source,
		})
	}

	/// An empty body and a literal `null` both count as absent.
	pub fn is_null(&self) -> bool {
		let mut trimmed: &[u8] = &self.body;
		while let [first, rest @ ..] = trimmed {
			if !first.is_ascii_whitespace() {
				break;
			}
			trimmed = rest;
		}
		while let [rest @ .., last] = trimmed {
			if !last.is_ascii_whitespace() {
				break;
			}
			trimmed = rest;
		}
		trimmed.is_empty() || trimmed == b"null"
	}
}

#[derive(Debug, Default)]
struct RefreshGate {
	last_succeeded: bool,
}

struct Inner {
	http: Client,
	base_url: Url,
	manifest_url: Url,
	session: SharedSession,
	refresh_gate: Mutex<RefreshGate>,
	/// Bumped after every completed refresh attempt, successful or not.
	refresh_epoch: AtomicU64,
}

/// Cheap to clone; all clones share one session and one refresh gate.
#[derive(Clone)]
pub struct ApiClient {
	inner: Arc<Inner>,
}

impl fmt::Debug for ApiClient {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ApiClient")
			.field("base_url", &self.inner.base_url.as_str())
			.field("manifest_url", &self.inner.manifest_url.as_str())
			.finish()
	}
}

impl ApiClient {
	pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
		let http = builder().timeout(config.timeout).build()?;
		let manifest_url = config
			.manifest_url()
			.map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
		Ok(Self::with_http(http, config.base_url.clone(), manifest_url))
	}

	pub fn with_http(http: Client, base_url: Url, manifest_url: Url) -> Self {
		Self {
			inner: Arc::new(Inner {
				http,
				base_url,
				manifest_url,
				session: Session::new_shared(),
				refresh_gate: Mutex::new(RefreshGate::default()),
				refresh_epoch: AtomicU64::new(0),
			}),
		}
	}

	pub fn base_url(&self) -> &Url {
		&self.inner.base_url
	}

	pub fn manifest_url(&self) -> &Url {
		&self.inner.manifest_url
	}

	pub fn session(&self) -> &SharedSession {
		&self.inner.session
	}

	/// Resolves a server-provided link, absolute or relative to the base URL.
	pub fn resolve_link(&self, link: &str) -> Result<Url, ApiError> {
		let link = link.trim();
		if link.is_empty() {
			return Err(ApiError::InvalidUrl("empty link".to_string()));
		}
		self
			.inner
			.base_url
			.join(link)
			.map_err(|e| ApiError::InvalidUrl(format!("{link}: {e}")))
	}

	pub async fn get(&self, url: Url) -> Result<ApiResponse, ApiError> {
		self.request(ApiRequest::get(url)).await
	}

	pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
		self.get(url).await?.json()
	}

	pub async fn get_bytes(&self, url: Url) -> Result<Bytes, ApiError> {
		Ok(self.get(url).await?.body)
	}

	pub async fn post(&self, url: Url, body: Value) -> Result<ApiResponse, ApiError> {
		self.request(ApiRequest::post(url, body)).await
	}

	pub async fn patch(&self, url: Url, body: Value) -> Result<ApiResponse, ApiError> {
		self.request(ApiRequest::patch(url, body)).await
	}

	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
		let seen_epoch = self.inner.refresh_epoch.load(Ordering::Acquire);
		let response = self.dispatch(&request).await?;

		if response.status() != StatusCode::UNAUTHORIZED {
			return finish(&request, response).await;
		}

		let anonymous = {
			let session = self.inner.session.read().await;
			self.is_unauthenticated_target(&session, &request.url)
		};
		if anonymous {
			return finish(&request, response).await;
		}

		self.recover_unauthorized(request, seen_epoch).await
	}

	/// Sends with the credentials held right now and returns without waiting.
	pub async fn send_detached(&self, request: ApiRequest) -> JoinHandle<()> {
		let builder = self.prepare(&request).await;
		tokio::spawn(async move {
			match builder.send().await {
				Ok(response) if response.status().is_success() => {
					debug!(url = %request.url, "detached request completed");
				}
				Ok(response) => {
					warn!(url = %request.url, status = %response.status(), "detached request rejected");
				}
				Err(e) => {
					warn!(url = %request.url, error = %e, "detached request failed");
				}
			}
		})
	}

	/// Refreshes the access token outside of the 401 path.
	pub async fn refresh_access_token(&self) -> Result<(), ApiError> {
		let mut gate = self.inner.refresh_gate.lock().await;
		let outcome = self.refresh_locked().await;
		gate.last_succeeded = outcome.is_ok();
		self.inner.refresh_epoch.fetch_add(1, Ordering::AcqRel);
		outcome
	}

	async fn recover_unauthorized(
		&self,
		request: ApiRequest,
		seen_epoch: u64,
	) -> Result<ApiResponse, ApiError> {
		let unauthorized = || ApiError::Status {
			status: StatusCode::UNAUTHORIZED,
			url: request.url.to_string(),
		};

		if !self.inner.session.read().await.can_refresh() {
			warn!(url = %request.url, "access token rejected and no refresh endpoint is known");
			return Err(ApiError::AuthExpired {
				url: request.url.to_string(),
			});
		}

		{
			let mut gate = self.inner.refresh_gate.lock().await;
			if self.inner.refresh_epoch.load(Ordering::Acquire) == seen_epoch {
				let outcome = self.refresh_locked().await;
				gate.last_succeeded = outcome.is_ok();
				self.inner.refresh_epoch.fetch_add(1, Ordering::AcqRel);
				if let Err(e) = outcome {
					warn!(url = %request.url, error = %e, "token refresh failed");
					return Err(unauthorized());
				}
			} else if !gate.last_succeeded {
				debug!(url = %request.url, "concurrent token refresh failed");
				return Err(unauthorized());
			} else {
				debug!(url = %request.url, "token already refreshed by a concurrent request");
			}
		}

		debug!(method = %request.method, url = %request.url, "replaying request after token refresh");
		let response = self.dispatch(&request).await?;
		finish(&request, response).await
	}

	/// Caller holds the refresh gate.
	async fn refresh_locked(&self) -> Result<(), ApiError> {
		let (url, refresh_token) = {
			let session = self.inner.session.read().await;
			let url = session
				.access_token_refresh_url()
				.cloned()
				.ok_or(ApiError::MissingLink("access_token_refresh_url"))?;
			(url, session.refresh_token().clone())
		};
		if refresh_token.is_empty() {
			return Err(ApiError::RefreshFailed("no refresh token held".to_string()));
		}

		info!(url = %url, "refreshing access token");

		let request = ApiRequest::post(url, json!({ "refresh": refresh_token.expose() }));
		let response = self
			.dispatch(&request)
			.await
			.map_err(|e| ApiError::RefreshFailed(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			return Err(ApiError::RefreshFailed(format!(
				"refresh endpoint returned {status}"
			)));
		}

		let refreshed: RefreshResponse = response
			.json()
			.await
			.map_err(|e| ApiError::RefreshFailed(e.to_string()))?;

		self
			.inner
			.session
			.write()
			.await
			.install_refreshed(refreshed.access, refreshed.refresh);

		info!("access token refreshed");
		Ok(())
	}

	async fn dispatch(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
		debug!(method = %request.method, url = %request.url, "sending request");
		let response = self.prepare(request).await.send().await?;
		Ok(response)
	}

	async fn prepare(&self, request: &ApiRequest) -> reqwest::RequestBuilder {
		let mut builder = self
			.inner
			.http
			.request(request.method.clone(), request.url.clone());
		if !request.query.is_empty() {
			builder = builder.query(&request.query);
		}
		if let Some(body) = &request.body {
			builder = builder.json(body);
		}

		let session = self.inner.session.read().await;
		if let Some(csrf) = session.csrf_token() {
			builder = builder.header(CSRF_HEADER, csrf);
		}
		if session.is_authenticated() && !self.is_unauthenticated_target(&session, &request.url) {
			builder = builder.bearer_auth(session.access_token().expose());
		}
		builder
	}

	/// The manifest root, the manifest's login URLs, any `login` path
	/// segment, and the refresh endpoint never carry a bearer token.
	fn is_unauthenticated_target(&self, session: &Session, url: &Url) -> bool {
		if same_endpoint(url, &self.inner.manifest_url) || has_login_segment(url) {
			return true;
		}
		if session
			.access_token_refresh_url()
			.is_some_and(|refresh| same_endpoint(url, refresh))
		{
			return true;
		}
		session.manifest().is_some_and(|manifest| {
			[&manifest.login_url, &manifest.login_google_url]
				.into_iter()
				.flatten()
				.filter_map(|link| self.resolve_link(link).ok())
				.any(|login| same_endpoint(url, &login))
		})
	}
}

async fn finish(request: &ApiRequest, response: reqwest::Response) -> Result<ApiResponse, ApiError> {
	let status = response.status();
	if !status.is_success() {
		debug!(method = %request.method, url = %request.url, status = %status, "request failed");
		return Err(ApiError::Status {
			status,
			url: request.url.to_string(),
		});
	}
	let body = response.bytes().await?;
	Ok(ApiResponse {
		status,
		url: request.url.clone(),
		body,
	})
}

fn same_endpoint(a: &Url, b: &Url) -> bool {
	a.scheme() == b.scheme()
		&& a.host_str() == b.host_str()
		&& a.port_or_known_default() == b.port_or_known_default()
		&& a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
}

fn has_login_segment(url: &Url) -> bool {
	url.path_segments().is_some_and(|mut segments| {
		segments.any(|s| s == "login" || s.starts_with("login_") || s.starts_with("login-"))
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn url(s: &str) -> Url {
		Url::parse(s).unwrap()
	}

	fn client() -> ApiClient {
		ApiClient::with_http(
			Client::new(),
			url("http://portal.example/"),
			url("http://portal.example/api/v2.3.0/"),
		)
	}

	#[test]
	fn user_agent_has_expected_shape() {
		let ua = user_agent();
		let parts: Vec<&str> = ua.split('/').collect();
		assert_eq!(parts.len(), 3);
		assert_eq!(parts[0], "kubeportal-client");
	}

	#[test]
	fn login_segments_are_detected() {
		assert!(has_login_segment(&url("http://p.example/api/v2/login/")));
		assert!(has_login_segment(&url("http://p.example/api/v2/login_google/")));
		assert!(has_login_segment(&url("http://p.example/login")));
		assert!(!has_login_segment(&url("http://p.example/api/v2/logins_report/")));
		assert!(!has_login_segment(&url("http://p.example/api/v2/users/1/")));
	}

	#[test]
	fn endpoints_compare_without_trailing_slash_or_query() {
		assert!(same_endpoint(
			&url("http://p.example/api/v2.3.0"),
			&url("http://p.example/api/v2.3.0/")
		));
		assert!(same_endpoint(
			&url("http://p.example:80/api/"),
			&url("http://p.example/api/?x=1")
		));
		assert!(!same_endpoint(
			&url("http://p.example/api/v2.3.0/pods/"),
			&url("http://p.example/api/v2.3.0/")
		));
	}

	#[test]
	fn manifest_login_and_refresh_urls_are_unauthenticated() {
		let api = client();
		let mut session = Session::default();
		session.set_manifest(crate::model::ApiManifest {
			login_url: Some("/auth/password".to_string()),
			..Default::default()
		});
		session.set_access_token_refresh_url(Some(url("http://portal.example/token/renew/")));

		assert!(api.is_unauthenticated_target(&session, &url("http://portal.example/api/v2.3.0/")));
		assert!(api.is_unauthenticated_target(&session, &url("http://portal.example/auth/password")));
		assert!(api.is_unauthenticated_target(&session, &url("http://portal.example/token/renew")));
		assert!(!api.is_unauthenticated_target(&session, &url("http://portal.example/users/1/")));
	}

	#[test]
	fn resolve_link_joins_relative_and_keeps_absolute() {
		let api = client();
		assert_eq!(
			api.resolve_link("/users/1").unwrap().as_str(),
			"http://portal.example/users/1"
		);
		assert_eq!(
			api.resolve_link("https://other.example/x").unwrap().as_str(),
			"https://other.example/x"
		);
		assert!(matches!(api.resolve_link("  "), Err(ApiError::InvalidUrl(_))));
	}

	#[test]
	fn null_and_empty_bodies_are_absent() {
		let response = |body: &'static [u8]| ApiResponse {
			status: StatusCode::OK,
			url: url("http://portal.example/x"),
			body: Bytes::from_static(body),
		};
		assert!(response(b"").is_null());
		assert!(response(b" null\n").is_null());
		assert!(!response(b"{}").is_null());
	}

	#[test]
	fn request_debug_hides_body() {
		let request = ApiRequest::post(
			url("http://portal.example/login"),
			json!({ "password": "hunter2" }),
		);
		let rendered = format!("{request:?}");
		assert!(!rendered.contains("hunter2"));
		assert!(rendered.contains("has_body: true"));
	}
}
