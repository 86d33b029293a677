// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for rule engine operations.
pub type Result<T> = std::result::Result<T, RulesError>;

/// Errors raised by the rule engine and its builder.
///
/// Every variant is a contract violation at the call site; none of them are
/// retried or recovered from internally.
#[derive(Error, Debug)]
pub enum RulesError {
	#[error("expected at least one action")]
	NoActions,

	#[error("action at position {index} must be a non-empty string")]
	EmptyAction { index: usize },

	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
}

impl RulesError {
	/// Returns true for errors caused by a malformed action argument.
	pub fn is_invalid_action(&self) -> bool {
		matches!(self, RulesError::NoActions | RulesError::EmptyAction { .. })
	}
}
