// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Non-fatal findings about a rule set.
//!
//! A [`RuleSet`](crate::RuleSet) reports conditions that are legal but almost
//! certainly a mistake, such as a list made only of deny rules, through a
//! [`DiagnosticsHook`]. The default hook, [`TracingDiagnostics`], logs them at
//! warn level. Install [`NoOpDiagnostics`] to silence them, or a custom hook to
//! route them elsewhere.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

/// A configuration finding that does not prevent the rule set from working.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Diagnostic {
	/// Every rule is a deny rule, so no action can ever be allowed.
	AllRulesInverted { rule_count: usize },
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Diagnostic::AllRulesInverted { rule_count } => write!(
				f,
				"rule set contains only inverted rules ({rule_count}); no action can be allowed"
			),
		}
	}
}

/// Receives diagnostics while a rule set is being indexed.
///
/// Called synchronously on the `replace` path, so keep it cheap.
pub trait DiagnosticsHook: Send + Sync + 'static {
	fn report(&self, diagnostic: &Diagnostic);
}

/// Type alias for a shared diagnostics hook.
pub type SharedDiagnosticsHook = Arc<dyn DiagnosticsHook>;

/// Logs diagnostics with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsHook for TracingDiagnostics {
	fn report(&self, diagnostic: &Diagnostic) {
		match diagnostic {
			Diagnostic::AllRulesInverted { rule_count } => {
				warn!(rule_count, "{diagnostic}");
			}
		}
	}
}

/// Discards all diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDiagnostics;

impl DiagnosticsHook for NoOpDiagnostics {
	fn report(&self, _diagnostic: &Diagnostic) {}
}
