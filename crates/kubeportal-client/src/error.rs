// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
	#[error("network error: {0}")]
	Network(#[from] reqwest::Error),

	#[error("unexpected status {status} from {url}")]
	Status { status: StatusCode, url: String },

	#[error("access token rejected by {url} and no refresh endpoint is known")]
	AuthExpired { url: String },

	#[error("token refresh failed: {0}")]
	RefreshFailed(String),

	#[error("failed to decode response from {url}: {source}")]
	Decode {
		url: String,
		#[source]
		source: serde_json::Error,
	},

	#[error("invalid URL: {0}")]
	InvalidUrl(String),

	#[error("link not available yet: {0}")]
	MissingLink(&'static str),
}

impl ApiError {
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::AuthExpired { .. } => Some(StatusCode::UNAUTHORIZED),
			Self::Network(e) => e.status(),
			_ => None,
		}
	}

	pub fn is_unauthorized(&self) -> bool {
		self.status() == Some(StatusCode::UNAUTHORIZED)
	}
}

#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Api(#[from] ApiError),

	#[error("background population task failed: {0}")]
	Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
	#[error(transparent)]
	Api(#[from] ApiError),

	#[error(transparent)]
	Sync(#[from] SyncError),

	#[error("state store error: {0}")]
	Store(#[from] StoreError),

	#[error("the API manifest has not been fetched")]
	NotBootstrapped,

	#[error("no user is signed in")]
	NotAuthenticated,

	#[error("login rejected: {0}")]
	LoginRejected(String),
}
