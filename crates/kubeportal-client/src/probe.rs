// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Best-effort reachability checks for ingress hosts.
//!
//! A probe is a single `OPTIONS` request with redirects disabled. Any 2xx
//! is reachable. A 3xx is also counted as reachable: the redirect target is
//! never visited, so where it leads is unobservable and a host that answers
//! with a redirect to a broken page still reads as `ok`. Other statuses are
//! reported raw and transport failures as `failed`.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
	Pending,
	Ok,
	Failed,
	Http(u16),
}

impl fmt::Display for ProbeStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProbeStatus::Pending => f.write_str("pending"),
			ProbeStatus::Ok => f.write_str("ok"),
			ProbeStatus::Failed => f.write_str("failed"),
			ProbeStatus::Http(code) => write!(f, "{code}"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
	/// Position of the ingress record this result belongs to.
	pub index: usize,
	pub host: Option<String>,
	pub status: ProbeStatus,
	/// `None` renders as `n/a`.
	pub elapsed_ms: Option<u64>,
}

impl ProbeResult {
	pub fn pending(index: usize) -> Self {
		Self {
			index,
			host: None,
			status: ProbeStatus::Pending,
			elapsed_ms: None,
		}
	}

	pub fn is_settled(&self) -> bool {
		self.status != ProbeStatus::Pending
	}

	/// Takes the outcome of a probe unless one was already recorded.
	pub fn settle(&mut self, outcome: ProbeResult) -> bool {
		if self.is_settled() || !outcome.is_settled() {
			return false;
		}
		self.host = outcome.host;
		self.status = outcome.status;
		self.elapsed_ms = outcome.elapsed_ms;
		true
	}

	pub fn elapsed_display(&self) -> String {
		match self.elapsed_ms {
			Some(ms) => format!("{ms} ms"),
			None => "n/a".to_string(),
		}
	}
}

pub fn classify(status: StatusCode) -> ProbeStatus {
	if status.is_success() || status.is_redirection() {
		ProbeStatus::Ok
	} else {
		ProbeStatus::Http(status.as_u16())
	}
}

#[derive(Debug, Clone)]
pub struct AvailabilityProber {
	http: Client,
}

impl AvailabilityProber {
	pub fn new(timeout: Duration) -> Result<Self, ApiError> {
		let http = crate::http::builder()
			.redirect(Policy::none())
			.timeout(timeout)
			.build()?;
		Ok(Self { http })
	}

	/// The client should have redirects disabled.
	pub fn with_http(http: Client) -> Self {
		Self { http }
	}

	pub async fn probe(&self, index: usize, host_url: &str) -> ProbeResult {
		let host = Some(host_url.to_string());
		let url = match Url::parse(host_url) {
			Ok(url) => url,
			Err(e) => {
				debug!(host = host_url, error = %e, "host is not a URL");
				return ProbeResult {
					index,
					host,
					status: ProbeStatus::Failed,
					elapsed_ms: None,
				};
			}
		};

		let started = Instant::now();
		match self.http.request(Method::OPTIONS, url).send().await {
			Ok(response) => {
				let elapsed_ms = started.elapsed().as_millis() as u64;
				let status = classify(response.status());
				debug!(host = host_url, status = %status, elapsed_ms, "probe answered");
				ProbeResult {
					index,
					host,
					status,
					elapsed_ms: Some(elapsed_ms),
				}
			}
			Err(e) => {
				debug!(host = host_url, error = %e, "probe failed");
				ProbeResult {
					index,
					host,
					status: ProbeStatus::Failed,
					elapsed_ms: None,
				}
			}
		}
	}
}
