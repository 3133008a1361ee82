// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use tracing::{debug, info};

use crate::layer::ConfigLayer;
use crate::paths::PathsConfig;
use crate::runtime::ClientConfig;
use crate::sources::ConfigSource;
use crate::ConfigError;

/// Collects sources and merges them in precedence order.
pub struct ConfigRegistry {
	sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigRegistry {
	pub fn new() -> Self {
		Self {
			sources: Vec::new(),
		}
	}

	pub fn register(&mut self, source: Box<dyn ConfigSource>) {
		debug!(source = source.name(), precedence = ?source.precedence(), "registering config source");
		self.sources.push(source);
	}

	/// A broken file fails the load; a missing one is skipped by the source.
	pub fn load(&self, paths: PathsConfig) -> Result<ClientConfig, ConfigError> {
		let mut sorted: Vec<_> = self.sources.iter().collect();
		sorted.sort_by_key(|s| s.precedence());

		let mut merged = ConfigLayer::default();
		for source in sorted {
			debug!(source = source.name(), "merging config layer");
			merged.merge(source.load()?);
		}

		let config = ClientConfig::from_layer(merged, &paths)?;

		info!(
				base_url = %config.base_url,
				api_version = %config.api_version,
				log_level = config.logging.level.as_str(),
				persist_state = config.state_file.is_some(),
				"configuration loaded"
		);

		Ok(config)
	}

	pub fn source_count(&self) -> usize {
		self.sources.len()
	}
}

impl Default for ConfigRegistry {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::ApiLayer;
	use crate::sources::{DefaultsSource, Precedence};

	struct FixedSource {
		precedence: Precedence,
		base_url: &'static str,
	}

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.precedence
		}

		fn load(&self) -> Result<ConfigLayer, ConfigError> {
			Ok(ConfigLayer {
				api: Some(ApiLayer {
					base_url: Some(self.base_url.to_string()),
					..Default::default()
				}),
				..Default::default()
			})
		}
	}

	#[test]
	fn registers_sources() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(DefaultsSource));
		assert_eq!(registry.source_count(), 1);
	}

	#[test]
	fn higher_precedence_wins_regardless_of_registration_order() {
		let mut registry = ConfigRegistry::new();
		registry.register(Box::new(FixedSource {
			precedence: Precedence::Cli,
			base_url: "https://cli.example",
		}));
		registry.register(Box::new(FixedSource {
			precedence: Precedence::UserFile,
			base_url: "https://file.example",
		}));

		let config = registry.load(PathsConfig::default()).unwrap();
		assert_eq!(config.base_url.as_str(), "https://cli.example/");
	}
}
