// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the kubeportal client.
//!
//! Layers are merged lowest precedence first:
//! defaults, user file, workspace file, environment, CLI flags.

pub mod error;
pub mod layer;
pub mod paths;
pub mod registry;
pub mod runtime;
pub mod sources;

pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use paths::PathsConfig;
pub use registry::ConfigRegistry;
pub use runtime::{ClientConfig, LogFormat, LogLevel, LoggingConfig, DEFAULT_API_VERSION};
pub use sources::{CliOverrides, ConfigSource, Precedence};

/// Load configuration from every source, with optional CLI overrides on top.
pub fn load_config(cli: CliOverrides) -> Result<ClientConfig, ConfigError> {
	let paths = paths::resolve_xdg_paths()?;

	let mut registry = ConfigRegistry::new();
	registry.register(Box::new(sources::DefaultsSource));
	match &cli.config_file {
		Some(path) => registry.register(Box::new(sources::FileSource::custom(
			path.clone(),
			Precedence::UserFile,
			"explicit-config",
		))),
		None => registry.register(Box::new(sources::FileSource::user(&paths))),
	}
	if let Ok(ws) = sources::FileSource::workspace() {
		registry.register(Box::new(ws));
	}
	registry.register(Box::new(sources::EnvSource));
	registry.register(Box::new(sources::CliSource::new(cli)));

	registry.load(paths)
}
