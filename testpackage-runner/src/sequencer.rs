// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic test sequencing.
//!
//! Turns a selector pattern into an ordered [`TestRequest`]: discovery, then
//! optional class-level sharding, then lexicographic ordering, then an
//! optional failure-recency pass that moves recently-failed tests to the
//! front. The output is a pure function of `(pattern, shard, history)`.

use crate::{
    partition::ShardAssignment,
    selector::{PackageSelector, SelectorParseError},
    test_list::{canonical_id, RequestedClass, TestIndex, TestRequest},
};
use std::collections::BTreeMap;

/// Runs-since-last-failure per canonical test id. Missing entries mean the
/// test has never failed and sort last.
pub type FailureHistory = BTreeMap<String, u64>;

/// Builds ordered execution requests from the static index.
#[derive(Clone, Copy, Debug, Default)]
pub struct TestSequencer {
    shard: Option<ShardAssignment>,
}

impl TestSequencer {
    /// A sequencer that runs every matching class.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequencer restricted to one shard of the class set.
    pub fn with_shard(shard: ShardAssignment) -> Self {
        Self { shard: Some(shard) }
    }

    /// Sequences tests in plain lexicographic order.
    pub fn sequence<'i>(
        &self,
        index: &'i TestIndex,
        pattern: &str,
    ) -> Result<TestRequest<'i>, SelectorParseError> {
        self.sequence_with_history(index, pattern, &FailureHistory::new())
    }

    /// Sequences tests, prioritising those that failed most recently.
    ///
    /// Classes sort by the minimum runs-since-last-failure over their
    /// methods, then methods within each class by their own value. Both
    /// sorts are stable, so lexicographic order breaks ties.
    pub fn sequence_with_history<'i>(
        &self,
        index: &'i TestIndex,
        pattern: &str,
        history: &FailureHistory,
    ) -> Result<TestRequest<'i>, SelectorParseError> {
        let selector: PackageSelector = pattern.parse()?;

        let mut classes: Vec<RequestedClass<'i>> = selector
            .discover(index)
            .into_iter()
            .filter(|class| {
                self.shard
                    .map_or(true, |shard| shard.matches_class(&class.name))
            })
            .map(|class| {
                let mut methods: Vec<_> = class.methods.iter().collect();
                methods.sort_by(|a, b| a.name.cmp(&b.name));
                RequestedClass { class, methods }
            })
            .collect();
        // discover() already yields classes in lexicographic order.

        if !history.is_empty() {
            for requested in &mut classes {
                let class_name = &requested.class.name;
                requested.methods.sort_by_key(|method| {
                    runs_since_failure(history, &method.name, class_name)
                });
            }
            classes.sort_by_key(|requested| {
                let class_name = &requested.class.name;
                requested
                    .methods
                    .iter()
                    .map(|method| runs_since_failure(history, &method.name, class_name))
                    .min()
                    .unwrap_or(u64::MAX)
            });
        }

        Ok(TestRequest::new(classes))
    }
}

fn runs_since_failure(history: &FailureHistory, method_name: &str, class_name: &str) -> u64 {
    history
        .get(&canonical_id(method_name, class_name))
        .copied()
        .unwrap_or(u64::MAX)
}
