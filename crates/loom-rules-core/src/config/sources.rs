// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use super::error::ConfigError;
use super::RuleSetConfigLayer;

pub const ENV_ENVIRONMENT: &str = "LOOM_RULES_ENVIRONMENT";
pub const ENV_MEMOIZE: &str = "LOOM_RULES_MEMOIZE";
pub const ENV_WARN_ALL_INVERTED: &str = "LOOM_RULES_WARN_ALL_INVERTED";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<RuleSetConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<RuleSetConfigLayer, ConfigError> {
		Ok(RuleSetConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/loom/rules.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<RuleSetConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(RuleSetConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: RuleSetConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Environment variable source.
///
/// Convention: `LOOM_RULES_<FIELD>`. Empty values are treated as unset.
pub struct EnvSource {
	lookup: Lookup,
}

impl EnvSource {
	/// Reads the process environment.
	pub fn new() -> Self {
		Self::with_lookup(|name| std::env::var(name).ok())
	}

	/// Reads variables through `lookup` instead of the process environment.
	pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
		Self {
			lookup: Box::new(lookup),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool_var(&self, name: &str) -> Result<Option<bool>, ConfigError> {
		match self.var(name) {
			Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => Ok(Some(true)),
			Some(v) if v == "0" || v.eq_ignore_ascii_case("false") => Ok(Some(false)),
			Some(v) => Err(ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid bool value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<RuleSetConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(RuleSetConfigLayer {
			environment: self.var(ENV_ENVIRONMENT),
			memoize: self.bool_var(ENV_MEMOIZE)?,
			warn_all_inverted: self.bool_var(ENV_WARN_ALL_INVERTED)?,
		})
	}
}
