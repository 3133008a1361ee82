// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! XDG path resolution for config and persisted session state.

use std::path::PathBuf;

use crate::ConfigError;

#[derive(Debug, Clone)]
pub struct PathsConfig {
	/// ~/.config/kubeportal/config.toml
	pub user_config_file: PathBuf,
	/// ~/.local/state/kubeportal/
	pub state_dir: PathBuf,
}

impl PathsConfig {
	/// Default location of the persisted session snapshot.
	pub fn default_state_file(&self) -> PathBuf {
		self.state_dir.join("session.json")
	}
}

impl Default for PathsConfig {
	fn default() -> Self {
		Self {
			user_config_file: PathBuf::from("~/.config/kubeportal/config.toml"),
			state_dir: PathBuf::from("~/.local/state/kubeportal"),
		}
	}
}

/// Uses XDG_CONFIG_HOME and XDG_STATE_HOME when set, otherwise the
/// conventional dot directories under the home directory.
pub fn resolve_xdg_paths() -> Result<PathsConfig, ConfigError> {
	let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;

	let config_home = std::env::var_os("XDG_CONFIG_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".config"));

	let state_home = std::env::var_os("XDG_STATE_HOME")
		.map(PathBuf::from)
		.unwrap_or_else(|| home.join(".local/state"));

	tracing::debug!(
			config_home = %config_home.display(),
			state_home = %state_home.display(),
			"resolved XDG paths"
	);

	Ok(PathsConfig {
		user_config_file: config_home.join("kubeportal/config.toml"),
		state_dir: state_home.join("kubeportal"),
	})
}

pub fn workspace_config_path() -> Result<PathBuf, ConfigError> {
	let cwd = std::env::current_dir()?;
	Ok(cwd.join(".kubeportal/config.toml"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolved_paths_live_under_kubeportal() {
		let paths = resolve_xdg_paths().unwrap();
		assert!(paths
			.user_config_file
			.to_string_lossy()
			.ends_with("kubeportal/config.toml"));
		assert!(paths.state_dir.to_string_lossy().ends_with("kubeportal"));
	}

	#[test]
	fn default_state_file_is_in_state_dir() {
		let paths = PathsConfig::default();
		assert_eq!(
			paths.default_state_file(),
			PathBuf::from("~/.local/state/kubeportal/session.json")
		);
	}

	#[test]
	fn workspace_config_is_relative_to_cwd() {
		let path = workspace_config_path().unwrap();
		assert!(path.ends_with(".kubeportal/config.toml"));
	}
}
