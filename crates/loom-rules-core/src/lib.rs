// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory permission rules for Loom.
//!
//! This crate answers "may this action be performed on this subject, in this
//! environment?" from an ordered list of allow and deny [`Rule`]s.
//!
//! - [`RuleSet`] indexes the rules and evaluates queries.
//! - [`RuleSetBuilder`] declares rules fluently; see [`RuleSet::define`].
//! - [`config`] loads [`RuleSetConfig`] from defaults, TOML and `LOOM_RULES_*`.
//! - [`DiagnosticsHook`] receives non-fatal findings about a rule set.
//!
//! A rule set notifies subscribers when its rules are replaced:
//!
//! ```
//! use loom_rules_core::{Rule, RuleSet};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let rules = RuleSet::new([Rule::allow("read", "Post")]);
//! assert!(rules.can("read", "Post")?);
//!
//! let updated = Arc::new(AtomicBool::new(false));
//! let flag = updated.clone();
//! let subscription = rules.on_updated(move |rules| {
//!     flag.store(rules.is_empty(), Ordering::SeqCst);
//! });
//!
//! rules.replace(Vec::new());
//! assert!(updated.load(Ordering::SeqCst));
//! assert!(!rules.can("read", "Post")?);
//! subscription.unsubscribe();
//! # Ok::<(), loom_rules_core::RulesError>(())
//! ```

mod builder;
pub mod config;
mod diagnostics;
mod error;
mod index;
mod rule;
mod rule_set;

pub use builder::{RuleHandle, RuleSetBuilder, ScopedRuleBuilder};
pub use config::{
	load_config, load_config_with_file, ConfigError, RuleSetConfig, RuleSetConfigLayer,
};
pub use diagnostics::{
	Diagnostic, DiagnosticsHook, NoOpDiagnostics, SharedDiagnosticsHook, TracingDiagnostics,
};
pub use error::{Result, RulesError};
pub use loom_common_events::Subscription;
pub use rule::{Actions, Rule, ALL_ENVIRONMENT, UNDEFINED_SUBJECT};
pub use rule_set::{EnvironmentView, EventPayload, RuleSet, RuleSetEvent, ScopedRuleSet};
