// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, files, environment, CLI.

use std::path::PathBuf;

use tracing::{debug, trace, warn};

use crate::layer::ConfigLayer;
use crate::paths::PathsConfig;
use crate::ConfigError;

/// Higher values override lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	UserFile = 30,
	WorkspaceFile = 40,
	Environment = 50,
	Cli = 60,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;

	fn precedence(&self) -> Precedence;

	fn load(&self) -> Result<ConfigLayer, ConfigError>;
}

/// Defaults are applied when the runtime config is built, so this layer is empty.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		Ok(ConfigLayer::default())
	}
}

pub struct FileSource {
	path: PathBuf,
	precedence: Precedence,
	name: &'static str,
}

impl FileSource {
	pub fn user(paths: &PathsConfig) -> Self {
		Self::custom(
			paths.user_config_file.clone(),
			Precedence::UserFile,
			"user-config",
		)
	}

	pub fn workspace() -> Result<Self, ConfigError> {
		Ok(Self::custom(
			crate::paths::workspace_config_path()?,
			Precedence::WorkspaceFile,
			"workspace-config",
		))
	}

	pub fn custom(path: PathBuf, precedence: Precedence, name: &'static str) -> Self {
		Self {
			path,
			precedence,
			name,
		}
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}

	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), source = self.name, "config file not found, skipping");
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), source = self.name, "loading config file");

		let content = std::fs::read_to_string(&self.path)?;
		toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})
	}
}

/// Reads `KUBEPORTAL_*` environment variables.
pub struct EnvSource;

impl EnvSource {
	fn apply(layer: &mut ConfigLayer, key: &str, value: String) {
		match key {
			"KUBEPORTAL_BASE_URL" => layer.api_mut().base_url = Some(value),
			"KUBEPORTAL_API_VERSION" => layer.api_mut().version = Some(value),
			"KUBEPORTAL_TIMEOUT_SECS" => match value.parse() {
				Ok(secs) => layer.api_mut().timeout_secs = Some(secs),
				Err(_) => warn!(key = %key, "ignoring non-numeric timeout"),
			},
			"KUBEPORTAL_LOG_LEVEL" => layer.logging_mut().level = Some(value),
			"KUBEPORTAL_LOG_FORMAT" => layer.logging_mut().format = Some(value),
			"KUBEPORTAL_STATE_FILE" => layer.state_mut().file = Some(PathBuf::from(value)),
			"KUBEPORTAL_PERSIST_STATE" => {
				layer.state_mut().persist = Some(matches!(value.as_str(), "1" | "true" | "yes"))
			}
			_ => {}
		}
	}

	/// Build a layer from an explicit set of variables.
	pub fn from_vars<I>(vars: I) -> ConfigLayer
	where
		I: IntoIterator<Item = (String, String)>,
	{
		let mut layer = ConfigLayer::default();
		for (key, value) in vars {
			if !key.starts_with("KUBEPORTAL_") {
				continue;
			}
			let value = value.trim().to_string();
			if value.is_empty() {
				continue;
			}
			trace!(key = %key, "processing env var");
			Self::apply(&mut layer, &key, value);
		}
		layer
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		Ok(Self::from_vars(std::env::vars()))
	}
}

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub base_url: Option<String>,
	pub api_version: Option<String>,
	pub log_level: Option<String>,
	pub log_format: Option<String>,
	pub state_file: Option<PathBuf>,
	pub config_file: Option<PathBuf>,
}

pub struct CliSource {
	overrides: CliOverrides,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		let mut layer = ConfigLayer::default();
		let o = &self.overrides;

		if let Some(url) = &o.base_url {
			layer.api_mut().base_url = Some(url.clone());
		}
		if let Some(version) = &o.api_version {
			layer.api_mut().version = Some(version.clone());
		}
		if let Some(level) = &o.log_level {
			layer.logging_mut().level = Some(level.clone());
		}
		if let Some(format) = &o.log_format {
			layer.logging_mut().format = Some(format.clone());
		}
		if let Some(file) = &o.state_file {
			layer.state_mut().file = Some(file.clone());
		}

		Ok(layer)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect()
	}

	#[test]
	fn precedence_ordering() {
		assert!(Precedence::Cli > Precedence::Environment);
		assert!(Precedence::Environment > Precedence::WorkspaceFile);
		assert!(Precedence::WorkspaceFile > Precedence::UserFile);
		assert!(Precedence::UserFile > Precedence::Defaults);
	}

	#[test]
	fn env_vars_map_onto_layer() {
		let layer = EnvSource::from_vars(vars(&[
			("KUBEPORTAL_BASE_URL", "https://portal.example"),
			("KUBEPORTAL_TIMEOUT_SECS", "12"),
			("KUBEPORTAL_LOG_FORMAT", "json"),
			("KUBEPORTAL_PERSIST_STATE", "false"),
			("HOME", "/root"),
		]));

		let api = layer.api.unwrap();
		assert_eq!(api.base_url.as_deref(), Some("https://portal.example"));
		assert_eq!(api.timeout_secs, Some(12));
		assert_eq!(layer.logging.unwrap().format.as_deref(), Some("json"));
		assert_eq!(layer.state.unwrap().persist, Some(false));
	}

	#[test]
	fn env_ignores_blank_and_bad_values() {
		let layer = EnvSource::from_vars(vars(&[
			("KUBEPORTAL_BASE_URL", "   "),
			("KUBEPORTAL_TIMEOUT_SECS", "soon"),
		]));
		assert!(layer.api.map(|a| a.base_url.is_none() && a.timeout_secs.is_none()).unwrap_or(true));
	}

	#[test]
	fn missing_file_yields_empty_layer() {
		let source = FileSource::custom(
			PathBuf::from("/nonexistent/kubeportal.toml"),
			Precedence::UserFile,
			"test",
		);
		let layer = source.load().unwrap();
		assert!(layer.api.is_none());
	}

	#[test]
	fn malformed_file_reports_path() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[api\nbase_url = ").unwrap();

		let source = FileSource::custom(file.path().to_path_buf(), Precedence::UserFile, "test");
		match source.load() {
			Err(ConfigError::TomlParse { path, .. }) => assert_eq!(path, file.path()),
			other => panic!("expected TomlParse, got {other:?}"),
		}
	}

	#[test]
	fn cli_overrides_only_set_fields() {
		let source = CliSource::new(CliOverrides {
			log_level: Some("trace".to_string()),
			..Default::default()
		});
		let layer = source.load().unwrap();
		assert!(layer.api.is_none());
		assert_eq!(layer.logging.unwrap().level.as_deref(), Some("trace"));
	}
}
