// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lookup index derived from an ordered rule list.

use std::collections::{BTreeSet, HashMap};

use crate::rule::Rule;

/// Priorities of every rule matching one (environment, subject, action).
pub(crate) type Bucket = BTreeSet<usize>;

type ActionMap = HashMap<String, Bucket>;
type SubjectMap = HashMap<String, ActionMap>;

/// `environment -> subject -> action -> priorities`.
///
/// Several rules may share a bucket; all of them are kept, ordered by
/// declaration.
#[derive(Debug, Default)]
pub(crate) struct RuleIndex {
	environments: HashMap<String, SubjectMap>,
}

impl RuleIndex {
	pub(crate) fn build(rules: &[Rule]) -> Self {
		let mut environments: HashMap<String, SubjectMap> = HashMap::new();

		for (priority, rule) in rules.iter().enumerate() {
			let subjects = environments.entry(rule.environment.clone()).or_default();
			let actions = subjects.entry(rule.subject.clone()).or_default();
			for action in &rule.actions {
				actions.entry(action.clone()).or_default().insert(priority);
			}
		}

		Self { environments }
	}

	pub(crate) fn bucket(&self, environment: &str, subject: &str, action: &str) -> Option<&Bucket> {
		self
			.environments
			.get(environment)?
			.get(subject)?
			.get(action)
	}

	pub(crate) fn environment_count(&self) -> usize {
		self.environments.len()
	}
}

/// A non-empty rule list made only of deny rules can never grant anything.
pub(crate) fn all_inverted(rules: &[Rule]) -> bool {
	!rules.is_empty() && rules.iter().all(|rule| rule.inverted)
}
