// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The rule engine.
//!
//! A [`RuleSet`] owns an ordered rule list and an index derived from it.
//! Queries read the index; `replace` swaps the list, the index and the lookup
//! cache together and then publishes [`RuleSetEvent::Updated`].
//!
//! # Decision
//!
//! For a query of actions `A` on subject `S` in environment `E`:
//!
//! 1. If any action in `A` has no rule at `(E, S, action)`, the query is not
//!    allowed.
//! 2. Otherwise it is allowed only if every matching rule of every action is
//!    an allow rule. A single deny rule anywhere makes it not allowed.
//!
//! [`RuleSet::can`] evaluates at the active environment, or at
//! [`ALL_ENVIRONMENT`] when none is set. [`RuleSet::at`] evaluates at a named
//! environment first and falls back to [`ALL_ENVIRONMENT`] only when the named
//! environment neither allows nor denies.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use loom_common_events::{EventHub, Subscription};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::config::RuleSetConfig;
use crate::diagnostics::{Diagnostic, SharedDiagnosticsHook, TracingDiagnostics};
use crate::error::Result;
use crate::index::{all_inverted, RuleIndex};
use crate::rule::{Actions, Rule, ALL_ENVIRONMENT, UNDEFINED_SUBJECT};

/// Payload handed to [`RuleSet::on`] handlers.
///
/// Use [`RuleSet::on_payload`] to receive a concrete type instead.
pub type EventPayload = dyn Any + Send + Sync;

/// Events published by a [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleSetEvent {
	/// Rules were replaced or the active environment changed.
	Updated,
}

impl RuleSetEvent {
	pub fn as_str(&self) -> &'static str {
		match self {
			RuleSetEvent::Updated => "updated",
		}
	}
}

impl fmt::Display for RuleSetEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl AsRef<str> for RuleSetEvent {
	fn as_ref(&self) -> &str {
		self.as_str()
	}
}

impl From<RuleSetEvent> for String {
	fn from(event: RuleSetEvent) -> Self {
		event.as_str().to_string()
	}
}

/// `environment -> subject -> action -> priorities`, filled on first lookup.
///
/// Nested so that a hit borrows the query strings instead of building a key.
type Memo = HashMap<String, HashMap<String, HashMap<String, Arc<[usize]>>>>;

/// Rules, index and cache as of one `replace`.
///
/// The cache lives and dies with the index it was derived from.
struct Generation {
	rules: Arc<[Rule]>,
	index: RuleIndex,
	cache: Mutex<Memo>,
	memoize: bool,
}

impl Generation {
	fn build(rules: Vec<Rule>, config: &RuleSetConfig, diagnostics: &SharedDiagnosticsHook) -> Self {
		let index = RuleIndex::build(&rules);

		if config.warn_all_inverted && all_inverted(&rules) {
			diagnostics.report(&Diagnostic::AllRulesInverted {
				rule_count: rules.len(),
			});
		}

		Self {
			rules: rules.into(),
			index,
			cache: Mutex::new(HashMap::new()),
			memoize: config.memoize,
		}
	}

	/// Priorities of the rules at one bucket, in declaration order.
	///
	/// Only existing buckets are cached, so the cache never outgrows the index.
	fn lookup(&self, environment: &str, subject: &str, action: &str) -> Option<Arc<[usize]>> {
		if !self.memoize {
			let bucket = self.index.bucket(environment, subject, action)?;
			return Some(bucket.iter().copied().collect());
		}

		if let Some(hit) = self
			.cache
			.lock()
			.get(environment)
			.and_then(|subjects| subjects.get(subject))
			.and_then(|actions| actions.get(action))
		{
			return Some(hit.clone());
		}

		let resolved: Arc<[usize]> = self
			.index
			.bucket(environment, subject, action)?
			.iter()
			.copied()
			.collect();
		self
			.cache
			.lock()
			.entry(environment.to_string())
			.or_default()
			.entry(subject.to_string())
			.or_default()
			.insert(action.to_string(), resolved.clone());
		Some(resolved)
	}

	/// All matching priorities, or `None` when some action cannot be resolved.
	fn resolve(&self, actions: &[String], subject: &str, environment: &str) -> Option<Vec<usize>> {
		let mut matched = Vec::new();
		for action in actions {
			matched.extend_from_slice(&self.lookup(environment, subject, action)?);
		}
		Some(matched)
	}

	fn verdict(&self, actions: &[String], subject: &str, environment: &str) -> Verdict {
		let Some(matched) = self.resolve(actions, subject, environment) else {
			return Verdict::default();
		};
		if matched.is_empty() {
			return Verdict::default();
		}

		let forbidden = matched.iter().any(|&p| self.rules[p].inverted);
		Verdict {
			allowed: !forbidden,
			forbidden,
		}
	}

	/// Reason of the earliest deny rule matching a fully resolved query.
	fn denial_reason(&self, actions: &[String], subject: &str, environment: &str) -> Option<String> {
		let mut matched = self.resolve(actions, subject, environment)?;
		matched.sort_unstable();

		matched
			.into_iter()
			.map(|p| &self.rules[p])
			.find(|rule| rule.inverted)
			.and_then(|rule| rule.reason.clone())
	}

	#[cfg(test)]
	fn cached_buckets(&self) -> usize {
		self
			.cache
			.lock()
			.values()
			.flat_map(|subjects| subjects.values())
			.map(|actions| actions.len())
			.sum()
	}
}

/// Outcome of evaluating a query in one environment.
///
/// Both flags are false when the query could not be fully resolved there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Verdict {
	allowed: bool,
	forbidden: bool,
}

/// An ordered set of permission rules with environment scoping and change
/// notification.
///
/// `RuleSet` is `Send + Sync`; share it with `Arc` to let subscribers query it
/// from their handlers.
pub struct RuleSet {
	generation: RwLock<Arc<Generation>>,
	environment: RwLock<String>,
	events: EventHub<EventPayload>,
	diagnostics: SharedDiagnosticsHook,
	config: RuleSetConfig,
}

impl RuleSet {
	/// Creates a rule set with the default configuration.
	pub fn new(rules: impl IntoIterator<Item = Rule>) -> Self {
		Self::with_config(rules, RuleSetConfig::default())
	}

	pub fn empty() -> Self {
		Self::new(Vec::new())
	}

	pub fn with_config(rules: impl IntoIterator<Item = Rule>, config: RuleSetConfig) -> Self {
		Self::with_diagnostics(rules, config, Arc::new(TracingDiagnostics))
	}

	/// Creates a rule set that reports diagnostics to `diagnostics`.
	pub fn with_diagnostics(
		rules: impl IntoIterator<Item = Rule>,
		config: RuleSetConfig,
		diagnostics: SharedDiagnosticsHook,
	) -> Self {
		let generation = Generation::build(rules.into_iter().collect(), &config, &diagnostics);
		debug!(
			rules = generation.rules.len(),
			environments = generation.index.environment_count(),
			environment = %config.environment,
			"rule set created"
		);

		Self {
			generation: RwLock::new(Arc::new(generation)),
			environment: RwLock::new(config.environment.clone()),
			events: EventHub::new(),
			diagnostics,
			config,
		}
	}

	/// The rules as last supplied, in their original order.
	///
	/// The returned slice is shared and immutable; a later `replace` does not
	/// change it.
	pub fn rules(&self) -> Arc<[Rule]> {
		self.current().rules.clone()
	}

	pub fn len(&self) -> usize {
		self.current().rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.current().rules.is_empty()
	}

	pub fn config(&self) -> &RuleSetConfig {
		&self.config
	}

	/// Atomically replaces every rule and publishes [`RuleSetEvent::Updated`].
	pub fn replace(&self, rules: impl IntoIterator<Item = Rule>) {
		let generation =
			Generation::build(rules.into_iter().collect(), &self.config, &self.diagnostics);
		debug!(
			rules = generation.rules.len(),
			environments = generation.index.environment_count(),
			"rule set replaced"
		);

		*self.generation.write() = Arc::new(generation);
		self.notify_updated();
	}

	/// Sets the active environment and publishes [`RuleSetEvent::Updated`].
	pub fn set_environment(&self, environment: impl Into<String>) -> &Self {
		let environment = environment.into();
		debug!(environment = %environment, "active environment changed");

		*self.environment.write() = environment;
		self.notify_updated();
		self
	}

	/// Clears the active environment and publishes [`RuleSetEvent::Updated`].
	pub fn clear_environment(&self) -> &Self {
		self.set_environment(String::new())
	}

	/// The active environment; empty when unscoped.
	pub fn environment(&self) -> String {
		self.environment.read().clone()
	}

	/// Comparisons against the active environment, taken as a snapshot.
	pub fn env(&self) -> EnvironmentView {
		EnvironmentView {
			value: self.environment(),
		}
	}

	/// Checks whether every action in `actions` is allowed on `subject`.
	///
	/// Evaluates at the active environment, or at [`ALL_ENVIRONMENT`] when no
	/// environment is active. Fails when `actions` is empty or contains an
	/// empty action.
	pub fn can(&self, actions: impl Into<Actions>, subject: &str) -> Result<bool> {
		let actions = actions.into();
		actions.validate()?;

		let environment = self.effective_environment();
		let allowed = self
			.current()
			.verdict(actions.as_slice(), subject, &environment)
			.allowed;

		trace!(
			actions = ?actions.as_slice(),
			subject,
			environment = %environment,
			allowed,
			"rule check"
		);
		Ok(allowed)
	}

	pub fn cannot(&self, actions: impl Into<Actions>, subject: &str) -> Result<bool> {
		self.can(actions, subject).map(|allowed| !allowed)
	}

	/// Checks an action-only rule, one declared without a subject.
	pub fn can_action(&self, action: &str) -> Result<bool> {
		self.can(action, UNDEFINED_SUBJECT)
	}

	pub fn cannot_action(&self, action: &str) -> Result<bool> {
		self.cannot(action, UNDEFINED_SUBJECT)
	}

	/// Scopes checks to `environment`, falling back to [`ALL_ENVIRONMENT`] for
	/// queries the environment does not decide.
	pub fn at(&self, environment: impl Into<String>) -> ScopedRuleSet<'_> {
		ScopedRuleSet {
			rule_set: self,
			environment: environment.into(),
		}
	}

	/// Rules matching one `(environment, subject, action)` bucket, in
	/// declaration order.
	pub fn rules_for(&self, action: &str, subject: &str, environment: &str) -> Vec<Rule> {
		let generation = self.current();
		match generation.lookup(environment, subject, action) {
			Some(priorities) => priorities
				.iter()
				.map(|&p| generation.rules[p].clone())
				.collect(),
			None => Vec::new(),
		}
	}

	/// Reason attached to the earliest deny rule matching the query at the
	/// effective environment.
	///
	/// Returns `None` when the query is not fully resolvable, nothing denies
	/// it, or the deny rule carries no reason.
	pub fn denial_reason(
		&self,
		actions: impl Into<Actions>,
		subject: &str,
	) -> Result<Option<String>> {
		let actions = actions.into();
		actions.validate()?;

		let environment = self.effective_environment();
		Ok(self
			.current()
			.denial_reason(actions.as_slice(), subject, &environment))
	}

	/// Registers `handler` for `event`. The handler receives whatever payload
	/// the event was emitted with; [`RuleSetEvent::Updated`] carries the rule
	/// set itself.
	pub fn on<F>(&self, event: impl Into<String>, handler: F) -> Subscription
	where
		F: Fn(&EventPayload) + Send + Sync + 'static,
	{
		self.events.on(event, handler)
	}

	/// Registers `handler` for `event`, called only for payloads of type `P`.
	pub fn on_payload<P, F>(&self, event: impl Into<String>, handler: F) -> Subscription
	where
		P: Any,
		F: Fn(&P) + Send + Sync + 'static,
	{
		self.events.on(event, move |payload: &EventPayload| {
			if let Some(payload) = payload.downcast_ref::<P>() {
				handler(payload);
			}
		})
	}

	/// Registers `handler` for [`RuleSetEvent::Updated`].
	pub fn on_updated<F>(&self, handler: F) -> Subscription
	where
		F: Fn(&RuleSet) + Send + Sync + 'static,
	{
		self.on_payload::<RuleSet, _>(RuleSetEvent::Updated, handler)
	}

	/// Synchronously invokes every handler registered for `event` with
	/// `payload`.
	pub fn emit<P>(&self, event: impl AsRef<str>, payload: &P)
	where
		P: Any + Send + Sync,
	{
		self.events.emit(event.as_ref(), payload);
	}

	fn notify_updated(&self) {
		self.emit(RuleSetEvent::Updated, self);
	}

	fn current(&self) -> Arc<Generation> {
		self.generation.read().clone()
	}

	fn effective_environment(&self) -> String {
		let environment = self.environment.read();
		if environment.is_empty() {
			ALL_ENVIRONMENT.to_string()
		} else {
			environment.clone()
		}
	}
}

impl Default for RuleSet {
	fn default() -> Self {
		Self::empty()
	}
}

impl fmt::Debug for RuleSet {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RuleSet")
			.field("rules", &self.rules())
			.field("environment", &self.environment())
			.field("events", &self.events)
			.finish()
	}
}

/// Checks bound to one environment, returned by [`RuleSet::at`].
#[derive(Debug)]
pub struct ScopedRuleSet<'a> {
	rule_set: &'a RuleSet,
	environment: String,
}

impl ScopedRuleSet<'_> {
	/// Checks `actions` on `subject` in this environment.
	///
	/// Environment rules that allow or deny the query decide it. Otherwise the
	/// query is evaluated at [`ALL_ENVIRONMENT`].
	pub fn can(&self, actions: impl Into<Actions>, subject: &str) -> Result<bool> {
		let actions = actions.into();
		actions.validate()?;

		let generation = self.rule_set.current();
		let scoped = generation.verdict(actions.as_slice(), subject, &self.environment);
		let allowed = if scoped.allowed {
			true
		} else if scoped.forbidden {
			false
		} else {
			generation
				.verdict(actions.as_slice(), subject, ALL_ENVIRONMENT)
				.allowed
		};

		trace!(
			actions = ?actions.as_slice(),
			subject,
			environment = %self.environment,
			allowed,
			"scoped rule check"
		);
		Ok(allowed)
	}

	pub fn cannot(&self, actions: impl Into<Actions>, subject: &str) -> Result<bool> {
		self.can(actions, subject).map(|allowed| !allowed)
	}

	pub fn can_action(&self, action: &str) -> Result<bool> {
		self.can(action, UNDEFINED_SUBJECT)
	}

	pub fn cannot_action(&self, action: &str) -> Result<bool> {
		self.cannot(action, UNDEFINED_SUBJECT)
	}

	/// Reason attached to the deny rule that decided this scoped query.
	///
	/// An environment deny reports its earliest deny rule. When the environment
	/// decides nothing, the reason comes from [`ALL_ENVIRONMENT`].
	pub fn denial_reason(
		&self,
		actions: impl Into<Actions>,
		subject: &str,
	) -> Result<Option<String>> {
		let actions = actions.into();
		actions.validate()?;

		let generation = self.rule_set.current();
		let scoped = generation.verdict(actions.as_slice(), subject, &self.environment);
		let reason = if scoped.allowed {
			None
		} else if scoped.forbidden {
			generation.denial_reason(actions.as_slice(), subject, &self.environment)
		} else {
			generation.denial_reason(actions.as_slice(), subject, ALL_ENVIRONMENT)
		};
		Ok(reason)
	}

	pub fn environment(&self) -> &str {
		&self.environment
	}
}

/// Snapshot of the active environment with comparison helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentView {
	value: String,
}

impl EnvironmentView {
	pub fn is(&self, environment: &str) -> bool {
		self.value == environment
	}

	pub fn not(&self, environment: &str) -> bool {
		!self.is(environment)
	}

	pub fn is_in<S: AsRef<str>>(&self, environments: &[S]) -> bool {
		environments.iter().any(|e| e.as_ref() == self.value)
	}

	pub fn not_in<S: AsRef<str>>(&self, environments: &[S]) -> bool {
		!self.is_in(environments)
	}

	pub fn value(&self) -> &str {
		&self.value
	}
}


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	fn arb_rule() -> impl Strategy<Value = Rule> {
		(
			prop::collection::vec(prop::sample::select(vec!["read", "update", "delete"]), 1..3),
			prop::sample::select(vec!["Post", "Comment"]),
			prop::sample::select(vec![ALL_ENVIRONMENT, "test", "prod"]),
			any::<bool>(),
		)
			.prop_map(|(actions, subject, environment, inverted)| Rule {
				actions: actions.into_iter().map(str::to_string).collect(),
				subject: subject.to_string(),
				environment: environment.to_string(),
				inverted,
				reason: None,
			})
	}

	fn expected(rules: &[Rule], action: &str, subject: &str, environment: &str) -> bool {
		let matching: Vec<&Rule> = rules
			.iter()
			.filter(|r| r.environment == environment && r.subject == subject)
			.filter(|r| r.actions.iter().any(|a| a == action))
			.collect();
		!matching.is_empty() && matching.iter().all(|r| !r.inverted)
	}

	proptest! {
		#[test]
		fn can_matches_reference_model(
			rules in prop::collection::vec(arb_rule(), 0..12),
			action in prop::sample::select(vec!["read", "update", "delete"]),
			subject in prop::sample::select(vec!["Post", "Comment"]),
		) {
			let rule_set = RuleSet::with_diagnostics(
				rules.clone(),
				RuleSetConfig::default(),
				Arc::new(crate::diagnostics::NoOpDiagnostics),
			);
			prop_assert_eq!(
				rule_set.can(action, subject).unwrap(),
				expected(&rules, action, subject, ALL_ENVIRONMENT)
			);
		}

		#[test]
		fn cannot_is_negation_of_can(
			rules in prop::collection::vec(arb_rule(), 0..12),
			actions in prop::collection::vec(prop::sample::select(vec!["read", "update", "delete"]), 1..3),
			subject in prop::sample::select(vec!["Post", "Comment"]),
			environment in prop::sample::select(vec!["test", "prod", "staging"]),
		) {
			let rule_set = RuleSet::with_diagnostics(
				rules,
				RuleSetConfig::default(),
				Arc::new(crate::diagnostics::NoOpDiagnostics),
			);
			prop_assert_eq!(
				rule_set.cannot(actions.clone(), subject).unwrap(),
				!rule_set.can(actions.clone(), subject).unwrap()
			);
			let scoped = rule_set.at(environment);
			prop_assert_eq!(
				scoped.cannot(actions.clone(), subject).unwrap(),
				!scoped.can(actions, subject).unwrap()
			);
		}

		#[test]
		fn replace_with_nothing_denies_everything(
			rules in prop::collection::vec(arb_rule(), 0..12),
			action in prop::sample::select(vec!["read", "update", "delete"]),
			subject in prop::sample::select(vec!["Post", "Comment"]),
		) {
			let rule_set = RuleSet::with_diagnostics(
				rules,
				RuleSetConfig::default(),
				Arc::new(crate::diagnostics::NoOpDiagnostics),
			);
			let _ = rule_set.can(action, subject).unwrap();

			rule_set.replace(Vec::new());
			prop_assert!(!rule_set.can(action, subject).unwrap());
			prop_assert!(!rule_set.at("test").can(action, subject).unwrap());
		}
	}
}
