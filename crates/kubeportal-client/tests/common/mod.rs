// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use kubeportal_client::{ApiClient, ApiManifest};
use kubeportal_common_secret::SecretString;
use serde_json::{json, Value};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const MANIFEST_PATH: &str = "/api/v2/";

pub fn client_for(server: &MockServer) -> ApiClient {
	let base = Url::parse(&format!("{}{MANIFEST_PATH}", server.uri())).unwrap();
	ApiClient::with_http(reqwest::Client::new(), base.clone(), base)
}

pub fn manifest() -> Value {
	json!({
		"branding": "Test Portal",
		"csrf_token": "abc",
		"login_url": "/login",
		"logout_url": "/logout",
	})
}

pub async fn mount_manifest(server: &MockServer) {
	Mock::given(method("GET"))
		.and(path(MANIFEST_PATH))
		.respond_with(ResponseTemplate::new(200).set_body_json(manifest()))
		.mount(server)
		.await;
}

/// Puts the client into an authenticated state without a login round trip.
pub async fn authenticate(api: &ApiClient, access: &str, refresh_url: Option<Url>) {
	let mut session = api.session().write().await;
	session.set_manifest(ApiManifest {
		csrf_token: Some("abc".to_string()),
		login_url: Some("/login".to_string()),
		..Default::default()
	});
	session.install_tokens(SecretString::from(access), SecretString::from("R"));
	session.set_access_token_refresh_url(refresh_url);
}

pub async fn requests_to(server: &MockServer, request_path: &str) -> Vec<Request> {
	server
		.received_requests()
		.await
		.unwrap_or_default()
		.into_iter()
		.filter(|r| r.url.path() == request_path)
		.collect()
}

pub fn authorization(request: &Request) -> Option<String> {
	request
		.headers
		.get("authorization")
		.map(|v| v.to_str().unwrap().to_string())
}
