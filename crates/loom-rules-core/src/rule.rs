// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::error::{Result, RulesError};

/// Environment that applies everywhere.
pub const ALL_ENVIRONMENT: &str = "all";

/// Subject used by action-only rules and queries.
pub const UNDEFINED_SUBJECT: &str = "undefined";

/// One grant or deny statement for a set of actions on a subject.
///
/// A rule's priority is its position in the sequence handed to a
/// [`RuleSet`](crate::RuleSet); it is not stored on the rule itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
	pub actions: Vec<String>,
	pub subject: String,
	#[serde(rename = "env", default = "default_environment")]
	pub environment: String,
	/// `true` for deny rules.
	#[serde(default, skip_serializing_if = "is_false")]
	pub inverted: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

fn default_environment() -> String {
	ALL_ENVIRONMENT.to_string()
}

fn is_false(value: &bool) -> bool {
	!*value
}

impl Rule {
	/// Creates a rule granting `actions` on `subject` in every environment.
	///
	/// The actions are not checked; use [`Rule::validate`] or
	/// [`RuleSetBuilder`](crate::RuleSetBuilder) to reject empty ones.
	pub fn allow(actions: impl Into<Actions>, subject: impl Into<String>) -> Self {
		Self {
			actions: actions.into().into_vec(),
			subject: subject.into(),
			environment: default_environment(),
			inverted: false,
			reason: None,
		}
	}

	/// Creates a rule denying `actions` on `subject` in every environment.
	///
	/// Like [`Rule::allow`], this does not check the actions.
	pub fn deny(actions: impl Into<Actions>, subject: impl Into<String>) -> Self {
		Self {
			inverted: true,
			..Self::allow(actions, subject)
		}
	}

	pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
		self.environment = environment.into();
		self
	}

	pub fn because(mut self, reason: impl Into<String>) -> Self {
		self.reason = Some(reason.into());
		self
	}

	pub fn is_allow(&self) -> bool {
		!self.inverted
	}

	/// Checks that the rule names at least one action and none are empty.
	pub fn validate(&self) -> Result<()> {
		validate_actions(&self.actions)
	}
}

fn validate_actions(actions: &[String]) -> Result<()> {
	if actions.is_empty() {
		return Err(RulesError::NoActions);
	}

	match actions.iter().position(|action| action.is_empty()) {
		Some(index) => Err(RulesError::EmptyAction { index }),
		None => Ok(()),
	}
}

/// One action or an ordered list of actions.
///
/// Converts from `&str`, `String`, slices, arrays and vectors of either, so
/// queries accept `"read"` and `["read", "delete"]` alike.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Actions(Vec<String>);

impl Actions {
	/// Checks that there is at least one action and none of them are empty.
	pub fn validate(&self) -> Result<()> {
		validate_actions(&self.0)
	}

	pub fn as_slice(&self) -> &[String] {
		&self.0
	}

	pub fn into_vec(self) -> Vec<String> {
		self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<&str> for Actions {
	fn from(action: &str) -> Self {
		Self(vec![action.to_string()])
	}
}

impl From<String> for Actions {
	fn from(action: String) -> Self {
		Self(vec![action])
	}
}

impl From<&String> for Actions {
	fn from(action: &String) -> Self {
		Self(vec![action.clone()])
	}
}

impl From<Vec<String>> for Actions {
	fn from(actions: Vec<String>) -> Self {
		Self(actions)
	}
}

impl From<Vec<&str>> for Actions {
	fn from(actions: Vec<&str>) -> Self {
		Self(actions.into_iter().map(str::to_string).collect())
	}
}

impl From<&[&str]> for Actions {
	fn from(actions: &[&str]) -> Self {
		Self(actions.iter().map(|a| a.to_string()).collect())
	}
}

impl From<&[String]> for Actions {
	fn from(actions: &[String]) -> Self {
		Self(actions.to_vec())
	}
}

impl<const N: usize> From<[&str; N]> for Actions {
	fn from(actions: [&str; N]) -> Self {
		Self(actions.iter().map(|a| a.to_string()).collect())
	}
}

impl<const N: usize> From<[String; N]> for Actions {
	fn from(actions: [String; N]) -> Self {
		Self(actions.into())
	}
}

impl FromIterator<String> for Actions {
	fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}
