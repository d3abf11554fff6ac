// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Greedy approximate test-subset optimization.
//!
//! Given the coverage repository's per-test bitmaps and costs, selects a
//! subset of the requested tests that reaches one of three targets: a fixed
//! test count, a coverage fraction, or a wall-clock budget. Selection is
//! greedy weighted set cover: at every step the candidate with the highest
//! newly-covered-probes-per-millisecond ratio wins. The ordering is total —
//! ratios compare by integer cross-multiplication, ties fall back to cost
//! ascending and then id — so results are identical across platforms. The
//! greedy strategy is approximate; for the coverage target it carries the
//! classical H(n) set-cover bound, and no optimality is claimed elsewhere.

use crate::{
    bitset::BitSet,
    coverage::{CoverageRepository, TestWithCoverage},
    test_list::TestRequest,
};
use std::collections::BTreeSet;

/// The single optimization target. Configuring none disables the optimizer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptimizeTarget {
    /// Select exactly this many tests, maximising union coverage.
    TestCount(usize),
    /// Select the cheapest prefix reaching this coverage fraction, in `(0, 1]`.
    Coverage(f64),
    /// Select the coverage-maximising subset within this budget (ms).
    CostMillis(u64),
}

impl OptimizeTarget {
    fn describe_goal(&self) -> String {
        match self {
            OptimizeTarget::TestCount(count) => {
                format!("best test coverage with exactly {count} tests run")
            }
            OptimizeTarget::Coverage(fraction) => format!(
                "quickest execution time for at least {:.1}% test coverage",
                fraction * 100.0
            ),
            OptimizeTarget::CostMillis(budget) => format!(
                "best test coverage for maximum execution time of {:.1}s",
                *budget as f64 / 1000.0
            ),
        }
    }
}

/// The chosen subset, exposed as a filter plus a human-readable plan.
#[derive(Clone, Debug)]
pub struct OptimizedSubset {
    selections: Vec<TestWithCoverage>,
    selected_ids: BTreeSet<String>,
    covered: BitSet,
    num_probe_points: usize,
}

impl OptimizedSubset {
    /// Returns true if the given test id is part of the subset.
    pub fn contains(&self, test_id: &str) -> bool {
        self.selected_ids.contains(test_id)
    }

    /// The selected tests, in pick order.
    pub fn selections(&self) -> &[TestWithCoverage] {
        &self.selections
    }

    /// Fraction of all probe points covered by the union of the subset.
    pub fn coverage_fraction(&self) -> f64 {
        if self.num_probe_points == 0 {
            0.0
        } else {
            self.covered.cardinality() as f64 / self.num_probe_points as f64
        }
    }

    /// Total cost of the subset in milliseconds.
    pub fn total_cost_millis(&self) -> u64 {
        self.selections.iter().map(|s| s.cost_millis).sum()
    }

    /// One-line plan description.
    pub fn describe(&self) -> String {
        format!(
            "{} tests selected, {:.1}% coverage, {} ms estimated execution time",
            self.selections.len(),
            self.coverage_fraction() * 100.0,
            self.total_cost_millis()
        )
    }
}

/// Greedy approximate subset optimizer over coverage-store snapshots.
#[derive(Clone, Debug)]
pub struct SubsetOptimizer {
    target: OptimizeTarget,
}

impl SubsetOptimizer {
    /// Creates an optimizer for the given target.
    pub fn new(target: OptimizeTarget) -> Self {
        Self { target }
    }

    /// Filters `request` down to an optimized subset using `repository`
    /// snapshots.
    ///
    /// Degenerate inputs (no coverage data at all, or nothing but
    /// zero-coverage candidates) log a warning and leave the request
    /// unfiltered, returning `None`.
    pub fn filter_request(
        &self,
        request: &mut TestRequest<'_>,
        repository: &CoverageRepository,
    ) -> Option<OptimizedSubset> {
        log::info!(
            "attempting to select a subset of tests that achieve {}",
            self.target.describe_goal()
        );

        let num_probe_points = repository.num_probe_points();
        if repository.is_empty() || num_probe_points == 0 {
            log::warn!("no coverage data found - test coverage cannot be optimized on this run");
            log::warn!("  (no coverage data was found in the store directory)");
            return None;
        }

        let candidates: Vec<TestWithCoverage> = request
            .test_ids()
            .into_iter()
            .map(|id| {
                repository
                    .test_with_coverage(&id)
                    .unwrap_or_else(|| TestWithCoverage::new(id, BitSet::new(num_probe_points), 1))
            })
            .collect();

        if candidates
            .iter()
            .all(|candidate| candidate.individual_coverage() == 0.0)
        {
            log::warn!("no coverage data found - test coverage cannot be optimized on this run");
            log::warn!("  all requested test methods have 0% coverage:");
            for candidate in &candidates {
                log::warn!(
                    "    {} ({:.1} %)",
                    candidate.id,
                    candidate.individual_coverage() * 100.0
                );
            }
            return None;
        }

        let subset = self.solve(candidates, num_probe_points);

        log::info!("optimizer complete - plan is {}:", subset.describe());
        for selection in subset.selections() {
            log::info!(
                "    {:<50} ({:>6} ms)  {}  {:.1}%",
                selection.id,
                selection.cost_millis,
                selection.coverage_bar(20),
                selection.individual_coverage() * 100.0
            );
        }

        request.retain(|id| subset.contains(id));
        Some(subset)
    }

    /// Runs the greedy selection over `candidates`.
    pub fn solve(
        &self,
        candidates: Vec<TestWithCoverage>,
        num_probe_points: usize,
    ) -> OptimizedSubset {
        let mut remaining = candidates;
        let mut selections = Vec::new();
        let mut covered = BitSet::new(num_probe_points);

        match self.target {
            OptimizeTarget::TestCount(count) => {
                for _ in 0..count {
                    if !pick_best(&mut remaining, &mut selections, &mut covered) {
                        break;
                    }
                }
            }
            OptimizeTarget::Coverage(fraction) => {
                while !remaining.is_empty()
                    && coverage_of(&covered, num_probe_points) < fraction
                {
                    pick_best(&mut remaining, &mut selections, &mut covered);
                }
            }
            OptimizeTarget::CostMillis(budget) => {
                let mut total_cost = 0u64;
                while !remaining.is_empty() {
                    let covered_before = covered.clone();
                    pick_best(&mut remaining, &mut selections, &mut covered);

                    let picked_cost = selections.last().map_or(0, |s| s.cost_millis);
                    total_cost += picked_cost;
                    if total_cost > budget {
                        // Roll the pick back and discard the candidate; a
                        // cheaper candidate later in the pool may still fit.
                        total_cost -= picked_cost;
                        selections.pop();
                        covered = covered_before;
                    }
                }
            }
        }

        let selected_ids = selections.iter().map(|s| s.id.clone()).collect();
        OptimizedSubset {
            selections,
            selected_ids,
            covered,
            num_probe_points,
        }
    }
}

fn coverage_of(covered: &BitSet, num_probe_points: usize) -> f64 {
    if num_probe_points == 0 {
        0.0
    } else {
        covered.cardinality() as f64 / num_probe_points as f64
    }
}

/// Scores every remaining candidate and commits the best one. Returns false
/// when the pool is empty.
///
/// A zero-cost candidate scores as cost 1 to keep the ratio defined.
fn pick_best(
    remaining: &mut Vec<TestWithCoverage>,
    selections: &mut Vec<TestWithCoverage>,
    covered: &mut BitSet,
) -> bool {
    let covered_cardinality = covered.cardinality();

    let mut best: Option<(usize, u128, u64)> = None;
    for (index, candidate) in remaining.iter().enumerate() {
        let gain = (covered.union_cardinality(&candidate.coverage) - covered_cardinality) as u128;
        let cost = candidate.cost_millis.max(1);

        let better = match best {
            None => true,
            Some((best_index, best_gain, best_cost)) => {
                // gain/cost vs best_gain/best_cost, compared exactly.
                let lhs = gain * u128::from(best_cost);
                let rhs = best_gain * u128::from(cost);
                lhs > rhs
                    || (lhs == rhs
                        && (cost < best_cost
                            || (cost == best_cost && candidate.id < remaining[best_index].id)))
            }
        };
        if better {
            best = Some((index, gain, cost));
        }
    }

    match best {
        Some((index, _, _)) => {
            let picked = remaining.remove(index);
            covered.union_with(&picked.coverage);
            selections.push(picked);
            true
        }
        None => false,
    }
}
