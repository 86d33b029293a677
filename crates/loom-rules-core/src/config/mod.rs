// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rule set configuration.
//!
//! Configuration is layered from built-in defaults, an optional TOML file and
//! `LOOM_RULES_*` environment variables, in that order of precedence.
//!
//! ```toml
//! # /etc/loom/rules.toml
//! environment = "staging"
//! memoize = true
//! warn_all_inverted = true
//! ```

mod error;
mod sources;

pub use error::ConfigError;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Resolved options for a [`RuleSet`](crate::RuleSet).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSetConfig {
	/// Initial active environment. Empty means unscoped.
	pub environment: String,
	/// Memoize per-bucket rule lookups until the next replace.
	pub memoize: bool,
	/// Report rule sets made only of deny rules.
	pub warn_all_inverted: bool,
}

impl Default for RuleSetConfig {
	fn default() -> Self {
		Self {
			environment: String::new(),
			memoize: true,
			warn_all_inverted: true,
		}
	}
}

/// Partial configuration produced by one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleSetConfigLayer {
	pub environment: Option<String>,
	pub memoize: Option<bool>,
	pub warn_all_inverted: Option<bool>,
}

impl RuleSetConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.environment.is_some() {
			self.environment = other.environment;
		}
		if other.memoize.is_some() {
			self.memoize = other.memoize;
		}
		if other.warn_all_inverted.is_some() {
			self.warn_all_inverted = other.warn_all_inverted;
		}
	}

	pub fn finalize(self) -> RuleSetConfig {
		let defaults = RuleSetConfig::default();
		RuleSetConfig {
			environment: self.environment.unwrap_or(defaults.environment),
			memoize: self.memoize.unwrap_or(defaults.memoize),
			warn_all_inverted: self.warn_all_inverted.unwrap_or(defaults.warn_all_inverted),
		}
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`LOOM_RULES_*`)
/// 2. Config file (`/etc/loom/rules.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<RuleSetConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource::new()),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<RuleSetConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource::new()),
	])
}

/// Merge the given sources in precedence order and resolve the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<RuleSetConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = RuleSetConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	let config = merged.finalize();
	info!(
		environment = %config.environment,
		memoize = config.memoize,
		warn_all_inverted = config.warn_all_inverted,
		"rule set configuration loaded"
	);
	Ok(config)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_values() {
		let config = RuleSetConfig::default();
		assert!(config.environment.is_empty());
		assert!(config.memoize);
		assert!(config.warn_all_inverted);
	}

	#[test]
	fn test_layer_finalize_defaults() {
		assert_eq!(RuleSetConfigLayer::default().finalize(), RuleSetConfig::default());
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = RuleSetConfigLayer {
			environment: Some("dev".to_string()),
			memoize: Some(true),
			warn_all_inverted: None,
		};
		base.merge(RuleSetConfigLayer {
			environment: Some("prod".to_string()),
			memoize: None,
			warn_all_inverted: Some(false),
		});

		assert_eq!(base.environment.as_deref(), Some("prod"));
		assert_eq!(base.memoize, Some(true));
		assert_eq!(base.warn_all_inverted, Some(false));
	}

	#[test]
	fn test_deserialize_layer_partial() {
		let layer: RuleSetConfigLayer = toml::from_str("memoize = false\n").unwrap();
		assert_eq!(layer.memoize, Some(false));
		assert!(layer.environment.is_none());
		assert!(layer.warn_all_inverted.is_none());
	}

	#[test]
	fn test_serde_roundtrip() {
		let config = RuleSetConfig {
			environment: "staging".to_string(),
			memoize: false,
			warn_all_inverted: true,
		};
		let toml_str = toml::to_string(&config).unwrap();
		let parsed: RuleSetConfig = toml::from_str(&toml_str).unwrap();
		assert_eq!(config, parsed);
	}

	struct FixedSource(Precedence, RuleSetConfigLayer);

	impl ConfigSource for FixedSource {
		fn name(&self) -> &'static str {
			"fixed"
		}

		fn precedence(&self) -> Precedence {
			self.0
		}

		fn load(&self) -> Result<RuleSetConfigLayer, ConfigError> {
			Ok(self.1.clone())
		}
	}

	#[test]
	fn test_sources_apply_by_precedence_not_order() {
		let env_layer = RuleSetConfigLayer {
			environment: Some("from-env".to_string()),
			..Default::default()
		};
		let file_layer = RuleSetConfigLayer {
			environment: Some("from-file".to_string()),
			memoize: Some(false),
			..Default::default()
		};

		let config = load_from_sources(vec![
			Box::new(FixedSource(Precedence::Environment, env_layer)),
			Box::new(FixedSource(Precedence::ConfigFile, file_layer)),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert_eq!(config.environment, "from-env");
		assert!(!config.memoize);
		assert!(config.warn_all_inverted);
	}
}
