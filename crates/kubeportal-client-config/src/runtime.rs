// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolved configuration with defaults applied.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::layer::{ApiLayer, ConfigLayer, LoggingLayer, StateLayer};
use crate::paths::PathsConfig;
use crate::ConfigError;

/// API version segment used for the manifest root, `/api/<version>/`.
pub const DEFAULT_API_VERSION: &str = "v2.3.0";

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
	pub base_url: Url,
	pub api_version: String,
	pub timeout: Duration,
	pub logging: LoggingConfig,
	/// `None` disables snapshot persistence.
	pub state_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
	pub level: LogLevel,
	pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Error,
	Warn,
	Info,
	Debug,
	Trace,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Error => "error",
			LogLevel::Warn => "warn",
			LogLevel::Info => "info",
			LogLevel::Debug => "debug",
			LogLevel::Trace => "trace",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	Pretty,
	Compact,
	Json,
}

impl ClientConfig {
	pub fn from_layer(layer: ConfigLayer, paths: &PathsConfig) -> Result<Self, ConfigError> {
		let api = layer.api.unwrap_or_default();
		Ok(Self {
			base_url: parse_base_url(&api)?,
			api_version: api
				.version
				.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
			timeout: Duration::from_secs(api.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
			logging: build_logging_config(layer.logging),
			state_file: build_state_file(layer.state, paths),
		})
	}

	/// The unauthenticated entry point, `<base>/api/<version>/`.
	pub fn manifest_url(&self) -> Result<Url, ConfigError> {
		let version = self.api_version.trim_matches('/');
		self
			.base_url
			.join(&format!("api/{version}/"))
			.map_err(|e| ConfigError::invalid_value("api.version", e.to_string()))
	}
}

fn parse_base_url(api: &ApiLayer) -> Result<Url, ConfigError> {
	let raw = api.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
	// Trailing slash so joins append instead of replacing the last segment.
	let normalized = format!("{}/", raw.trim_end_matches('/'));
	let url = Url::parse(&normalized)
		.map_err(|e| ConfigError::invalid_value("api.base_url", e.to_string()))?;
	match url.scheme() {
		"http" | "https" => Ok(url),
		other => Err(ConfigError::invalid_value(
			"api.base_url",
			format!("unsupported scheme '{other}'"),
		)),
	}
}

fn build_logging_config(layer: Option<LoggingLayer>) -> LoggingConfig {
	let layer = layer.unwrap_or_default();
	LoggingConfig {
		level: parse_log_level(layer.level.as_deref()),
		format: parse_log_format(layer.format.as_deref()),
	}
}

fn build_state_file(layer: Option<StateLayer>, paths: &PathsConfig) -> Option<PathBuf> {
	let layer = layer.unwrap_or_default();
	if layer.persist == Some(false) {
		return None;
	}
	Some(layer.file.unwrap_or_else(|| paths.default_state_file()))
}

fn parse_log_level(s: Option<&str>) -> LogLevel {
	match s {
		Some("error") => LogLevel::Error,
		Some("warn") => LogLevel::Warn,
		Some("debug") => LogLevel::Debug,
		Some("trace") => LogLevel::Trace,
		_ => LogLevel::Info,
	}
}

fn parse_log_format(s: Option<&str>) -> LogFormat {
	match s {
		Some("json") => LogFormat::Json,
		Some("compact") => LogFormat::Compact,
		_ => LogFormat::Pretty,
	}
}
