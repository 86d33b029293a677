// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fluent rule definition.
//!
//! ```
//! use loom_rules_core::RuleSet;
//!
//! let rules = RuleSet::define(|rules| {
//!     rules.can(["read", "update"], "Post")?;
//!     rules.cannot("delete", "Post")?.because("posts are kept forever");
//!     rules.at("staging").can("delete", "Post")?;
//!     Ok(())
//! })?;
//!
//! assert!(rules.can("read", "Post")?);
//! assert!(rules.cannot("delete", "Post")?);
//! assert!(rules.at("staging").can("delete", "Post")?);
//! # Ok::<(), loom_rules_core::RulesError>(())
//! ```

use std::future::Future;
use std::sync::Arc;

use crate::config::RuleSetConfig;
use crate::diagnostics::SharedDiagnosticsHook;
use crate::error::Result;
use crate::rule::{Actions, Rule, ALL_ENVIRONMENT, UNDEFINED_SUBJECT};
use crate::rule_set::RuleSet;

/// Accumulates rules in declaration order and builds a [`RuleSet`].
#[derive(Debug, Default, Clone)]
pub struct RuleSetBuilder {
	rules: Vec<Rule>,
}

impl RuleSetBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Declares an allow rule valid in every environment.
	pub fn can(
		&mut self,
		actions: impl Into<Actions>,
		subject: impl Into<String>,
	) -> Result<RuleHandle<'_>> {
		self.push(actions.into(), subject.into(), ALL_ENVIRONMENT.to_string(), false)
	}

	/// Declares a deny rule valid in every environment.
	pub fn cannot(
		&mut self,
		actions: impl Into<Actions>,
		subject: impl Into<String>,
	) -> Result<RuleHandle<'_>> {
		self.push(actions.into(), subject.into(), ALL_ENVIRONMENT.to_string(), true)
	}

	/// Declares an allow rule without a subject.
	pub fn can_action(&mut self, action: &str) -> Result<RuleHandle<'_>> {
		self.can(action, UNDEFINED_SUBJECT)
	}

	/// Declares a deny rule without a subject.
	pub fn cannot_action(&mut self, action: &str) -> Result<RuleHandle<'_>> {
		self.cannot(action, UNDEFINED_SUBJECT)
	}

	/// Declares rules that only apply in `environment`.
	pub fn at(&mut self, environment: impl Into<String>) -> ScopedRuleBuilder<'_> {
		ScopedRuleBuilder {
			builder: self,
			environment: environment.into(),
		}
	}

	/// Rules declared so far.
	pub fn rules(&self) -> &[Rule] {
		&self.rules
	}

	pub fn build(self) -> RuleSet {
		RuleSet::new(self.rules)
	}

	pub fn build_with_config(self, config: RuleSetConfig) -> RuleSet {
		RuleSet::with_config(self.rules, config)
	}

	pub fn build_with_diagnostics(
		self,
		config: RuleSetConfig,
		diagnostics: SharedDiagnosticsHook,
	) -> RuleSet {
		RuleSet::with_diagnostics(self.rules, config, diagnostics)
	}

	fn push(
		&mut self,
		actions: Actions,
		subject: String,
		environment: String,
		inverted: bool,
	) -> Result<RuleHandle<'_>> {
		actions.validate()?;
		self.rules.push(Rule {
			actions: actions.into_vec(),
			subject,
			environment,
			inverted,
			reason: None,
		});

		let index = self.rules.len() - 1;
		Ok(RuleHandle {
			rule: &mut self.rules[index],
		})
	}
}

/// Environment-scoped view of a [`RuleSetBuilder`], returned by
/// [`RuleSetBuilder::at`].
#[derive(Debug)]
pub struct ScopedRuleBuilder<'a> {
	builder: &'a mut RuleSetBuilder,
	environment: String,
}

impl ScopedRuleBuilder<'_> {
	pub fn can(
		&mut self,
		actions: impl Into<Actions>,
		subject: impl Into<String>,
	) -> Result<RuleHandle<'_>> {
		let environment = self.environment.clone();
		self
			.builder
			.push(actions.into(), subject.into(), environment, false)
	}

	pub fn cannot(
		&mut self,
		actions: impl Into<Actions>,
		subject: impl Into<String>,
	) -> Result<RuleHandle<'_>> {
		let environment = self.environment.clone();
		self
			.builder
			.push(actions.into(), subject.into(), environment, true)
	}

	pub fn can_action(&mut self, action: &str) -> Result<RuleHandle<'_>> {
		self.can(action, UNDEFINED_SUBJECT)
	}

	pub fn cannot_action(&mut self, action: &str) -> Result<RuleHandle<'_>> {
		self.cannot(action, UNDEFINED_SUBJECT)
	}
}

/// The rule just declared; lets the definer attach a reason.
#[derive(Debug)]
pub struct RuleHandle<'a> {
	rule: &'a mut Rule,
}

impl RuleHandle<'_> {
	/// Sets the human-readable reason for this rule.
	pub fn because(self, reason: impl Into<String>) {
		self.rule.reason = Some(reason.into());
	}

	pub fn rule(&self) -> &Rule {
		self.rule
	}
}

impl RuleSet {
	/// Builds a rule set from a synchronous definer.
	///
	/// The first rejected declaration aborts the definition and is returned.
	pub fn define<F>(definer: F) -> Result<RuleSet>
	where
		F: FnOnce(&mut RuleSetBuilder) -> Result<()>,
	{
		let mut builder = RuleSetBuilder::new();
		definer(&mut builder)?;
		Ok(builder.build())
	}

	/// Builds a rule set once an asynchronous definer completes.
	///
	/// The definer takes ownership of the builder and hands it back when done.
	pub async fn define_async<F, Fut>(definer: F) -> Result<RuleSet>
	where
		F: FnOnce(RuleSetBuilder) -> Fut,
		Fut: Future<Output = Result<RuleSetBuilder>>,
	{
		let builder = definer(RuleSetBuilder::new()).await?;
		Ok(builder.build())
	}

	/// Like [`RuleSet::define`], with an explicit configuration.
	pub fn define_with_config<F>(config: RuleSetConfig, definer: F) -> Result<RuleSet>
	where
		F: FnOnce(&mut RuleSetBuilder) -> Result<()>,
	{
		let mut builder = RuleSetBuilder::new();
		definer(&mut builder)?;
		Ok(builder.build_with_config(config))
	}
}

impl From<RuleSetBuilder> for Arc<RuleSet> {
	fn from(builder: RuleSetBuilder) -> Self {
		Arc::new(builder.build())
	}
}
