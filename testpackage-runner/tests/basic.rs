// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scenarios over a fixture index: discovery, wildcards,
//! prioritisation, sharding, fail-fast and output levels.

use proptest::prelude::*;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Write,
    sync::{Mutex, MutexGuard, PoisonError},
};
use testpackage_runner::{
    bitset::BitSet,
    config::Configuration,
    coverage::CoverageRepository,
    optimizer::{OptimizeTarget, SubsetOptimizer},
    partition::ShardAssignment,
    reporter::{RunReporter, StreamSource},
    runner::{RunOutcome, TestRunner},
    sequencer::{FailureHistory, TestSequencer},
    test_list::{TestClass, TestFailure, TestIndex, TestMethod, TestOutcome},
};

// Runs mutate the process-wide stdout/stderr descriptors during capture, so
// every test that executes tests (rather than just sequencing them) takes
// this lock.
static CAPTURE_LOCK: Mutex<()> = Mutex::new(());

fn capture_lock() -> MutexGuard<'static, ()> {
    CAPTURE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

fn passes() -> TestOutcome {
    TestOutcome::Passed
}

fn passes_noisily() -> TestOutcome {
    let _ = writeln!(std::io::stdout(), "Stdout for passing test");
    TestOutcome::Passed
}

fn fails_noisily() -> TestOutcome {
    let _ = writeln!(std::io::stdout(), "Stdout for failing test");
    TestOutcome::Failed(TestFailure::new("AssertionError", "expected condition to hold"))
}

fn fails() -> TestOutcome {
    TestOutcome::Failed(TestFailure::new("AssertionError", "deliberate failure"))
}

fn simple_class(name: &str) -> TestClass {
    TestClass::new(
        name,
        vec![
            TestMethod::new("testTrue1", passes),
            TestMethod::new("testTrue2", passes),
        ],
    )
}

fn sharding_class(name: &str) -> TestClass {
    TestClass::new(
        name,
        vec![
            TestMethod::new("testA", passes),
            TestMethod::new("testB", passes),
        ],
    )
}

fn index() -> TestIndex {
    TestIndex::new(vec![
        simple_class("org.example.simpletests.SimpleTest"),
        simple_class("org.example.wildcards.SimpleTest"),
        simple_class("org.example.wildcards.include1.SimpleTest"),
        simple_class("org.example.wildcards.include1.includesub1.SimpleTest"),
        simple_class("org.example.wildcards.include1.includesub2.SimpleTest"),
        simple_class("org.example.wildcards.include2.SimpleTest"),
        TestClass::not_runnable("org.example.wildcards.AbstractBaseTest"),
        TestClass::new(
            "org.example.failureprioritisationtests.aaa_NoRecentFailuresTest",
            vec![TestMethod::new("testTrue", passes)],
        ),
        TestClass::new(
            "org.example.failureprioritisationtests.zzz_JustFailedTest",
            vec![
                TestMethod::new("testThatHasNotFailed", passes),
                TestMethod::new("testTrue", passes),
            ],
        ),
        sharding_class("org.example.shardingtests.FirstTest"),
        sharding_class("org.example.shardingtests.SecondTest"),
        sharding_class("org.example.shardingtests.ThirdTest"),
        TestClass::new(
            "org.example.failfasttests.aaa_FailingTest",
            vec![TestMethod::new("testFails", fails)],
        ),
        TestClass::new(
            "org.example.failfasttests.zzz_PassingTest",
            vec![TestMethod::new("testPasses", passes)],
        ),
        TestClass::new(
            "org.example.outputleveltests.SimpleTest",
            vec![
                TestMethod::new("failing", fails_noisily),
                TestMethod::new("passing", passes_noisily),
            ],
        ),
    ])
}

struct ScenarioResult {
    outcome: RunOutcome,
    output: String,
    captured_out: BTreeMap<String, String>,
}

/// Sequences per `config` and runs the result, collecting reporter output
/// and per-class captured stdout.
fn execute(config: &Configuration, history: &FailureHistory) -> ScenarioResult {
    let _guard = capture_lock();
    let index = index();
    let sequencer = match config.shard {
        Some(shard) => TestSequencer::with_shard(shard),
        None => TestSequencer::new(),
    };
    let request = sequencer
        .sequence_with_history(&index, &config.pattern, history)
        .expect("pattern is valid");
    let class_names: Vec<String> = request
        .classes()
        .iter()
        .map(|rc| rc.class.name.clone())
        .collect();

    let mut reporter = RunReporter::new(config, Vec::new());
    let outcome = TestRunner::new(request)
        .execute(&mut reporter)
        .expect("writing to a buffer cannot fail");
    let captured_out = class_names
        .into_iter()
        .map(|name| {
            let bytes = reporter.read_out(&name).to_vec();
            (name, String::from_utf8_lossy(&bytes).into_owned())
        })
        .collect();
    let buffer = reporter.into_writer();

    ScenarioResult {
        outcome,
        output: String::from_utf8_lossy(&buffer).into_owned(),
        captured_out,
    }
}

fn sequence_ids(pattern: &str, shard: Option<ShardAssignment>, history: &FailureHistory) -> Vec<String> {
    let index = index();
    let sequencer = match shard {
        Some(shard) => TestSequencer::with_shard(shard),
        None => TestSequencer::new(),
    };
    sequencer
        .sequence_with_history(&index, pattern, history)
        .expect("pattern is valid")
        .test_ids()
}

fn shard_classes(pattern: &str, index_in: u64, total: u64) -> BTreeSet<String> {
    let index = index();
    let shard = ShardAssignment::new(index_in, total).unwrap();
    TestSequencer::with_shard(shard)
        .sequence(&index, pattern)
        .unwrap()
        .classes()
        .iter()
        .map(|rc| rc.class.name.clone())
        .collect()
}

#[test]
fn simple_discovery_in_lexicographic_order() {
    assert_eq!(
        sequence_ids("org.example.simpletests", None, &FailureHistory::new()),
        vec![
            "testTrue1(org.example.simpletests.SimpleTest)",
            "testTrue2(org.example.simpletests.SimpleTest)",
        ]
    );
}

#[test]
fn trailing_wildcard_discovers_subpackages() {
    assert_eq!(
        sequence_ids(
            "org.example.wildcards.include*",
            None,
            &FailureHistory::new()
        ),
        vec![
            "testTrue1(org.example.wildcards.include1.SimpleTest)",
            "testTrue2(org.example.wildcards.include1.SimpleTest)",
            "testTrue1(org.example.wildcards.include1.includesub1.SimpleTest)",
            "testTrue2(org.example.wildcards.include1.includesub1.SimpleTest)",
            "testTrue1(org.example.wildcards.include1.includesub2.SimpleTest)",
            "testTrue2(org.example.wildcards.include1.includesub2.SimpleTest)",
            "testTrue1(org.example.wildcards.include2.SimpleTest)",
            "testTrue2(org.example.wildcards.include2.SimpleTest)",
        ]
    );
}

#[test]
fn literal_pattern_excludes_subpackages() {
    assert_eq!(
        sequence_ids("org.example.wildcards", None, &FailureHistory::new()),
        vec![
            "testTrue1(org.example.wildcards.SimpleTest)",
            "testTrue2(org.example.wildcards.SimpleTest)",
        ]
    );
}

#[test]
fn middle_wildcard_selects_only_matching_subpackages() {
    assert_eq!(
        sequence_ids(
            "org.example.wildcards.*.includesub",
            None,
            &FailureHistory::new()
        ),
        vec![
            "testTrue1(org.example.wildcards.include1.includesub1.SimpleTest)",
            "testTrue2(org.example.wildcards.include1.includesub1.SimpleTest)",
            "testTrue1(org.example.wildcards.include1.includesub2.SimpleTest)",
            "testTrue2(org.example.wildcards.include1.includesub2.SimpleTest)",
        ]
    );
}

#[test]
fn recent_failures_run_first() {
    let mut history = FailureHistory::new();
    history.insert(
        "testTrue(org.example.failureprioritisationtests.zzz_JustFailedTest)".to_owned(),
        0,
    );

    assert_eq!(
        sequence_ids(
            "org.example.failureprioritisationtests",
            None,
            &history
        ),
        vec![
            "testTrue(org.example.failureprioritisationtests.zzz_JustFailedTest)",
            "testThatHasNotFailed(org.example.failureprioritisationtests.zzz_JustFailedTest)",
            "testTrue(org.example.failureprioritisationtests.aaa_NoRecentFailuresTest)",
        ]
    );
}

#[test]
fn single_shard_runs_everything() {
    let ids = sequence_ids(
        "org.example.shardingtests",
        Some(ShardAssignment::new(0, 1).unwrap()),
        &FailureHistory::new(),
    );
    assert_eq!(ids.len(), 6);
}

#[test]
fn shards_partition_the_class_set() {
    let all = shard_classes("org.example.shardingtests", 0, 1);
    assert_eq!(all.len(), 3);

    let mut seen = BTreeSet::new();
    let mut total_classes = 0;
    for i in 0..3 {
        let classes = shard_classes("org.example.shardingtests", i, 3);
        total_classes += classes.len();
        seen.extend(classes);
    }
    // Disjoint union over all shards equals the full candidate set.
    assert_eq!(seen, all);
    assert_eq!(total_classes, all.len());
}

#[test]
fn oversized_shard_count_is_not_an_error() {
    let mut seen = BTreeSet::new();
    for i in 0..10 {
        let classes = shard_classes("org.example.shardingtests", i, 10);
        seen.extend(classes);
    }
    assert_eq!(seen.len(), 3);
    // At least seven of the ten shards were empty and none raised an error.
}

#[test]
fn sharding_does_not_prevent_prioritisation() {
    let mut history = FailureHistory::new();
    history.insert("testB(org.example.shardingtests.FirstTest)".to_owned(), 0);

    for i in 0..3 {
        let ids = sequence_ids(
            "org.example.shardingtests",
            Some(ShardAssignment::new(i, 3).unwrap()),
            &history,
        );
        if ids
            .iter()
            .any(|id| id.contains("FirstTest"))
        {
            assert_eq!(ids[0], "testB(org.example.shardingtests.FirstTest)");
            assert_eq!(ids[1], "testA(org.example.shardingtests.FirstTest)");
        }
    }
}

#[test]
fn without_fail_fast_both_tests_run() {
    let config = Configuration::new("org.example.failfasttests");
    let result = execute(&config, &FailureHistory::new());

    assert_eq!(result.outcome.stats.failed, 1);
    assert_eq!(result.outcome.stats.passed(), 1);
    assert!(!result.outcome.stats.is_success());

    let failing_at = result
        .output
        .find("aaa_FailingTest")
        .expect("failing test is reported");
    let passing_at = result
        .output
        .find("zzz_PassingTest")
        .expect("passing test is reported");
    assert!(failing_at < passing_at);
}

#[test]
fn fail_fast_aborts_before_later_tests() {
    let mut config = Configuration::new("org.example.failfasttests");
    config.fail_fast = true;
    let result = execute(&config, &FailureHistory::new());

    assert!(result.output.contains("*** TESTS ABORTED"));
    assert!(!result.output.contains("zzz_PassingTest"));
    assert_eq!(result.outcome.executed.len(), 1);
    assert!(!result.outcome.stats.is_success());
}

#[test]
fn quiet_mode_suppresses_progress_and_captures() {
    let mut config = Configuration::new("org.example.outputleveltests");
    config.quiet = true;
    let result = execute(&config, &FailureHistory::new());

    assert!(!result.output.contains("SimpleTest.passing"));
    assert!(result.output.contains("SimpleTest.failing"));

    assert!(!result.output.contains("Stdout for passing test"));
    assert!(!result.output.contains("Stdout for failing test"));

    assert!(result.output.contains("*** TESTS COMPLETE"));
    assert!(result.output.contains("*** 1 passed"));

    assert!(!result.output.contains("Failures:"));
    assert!(!result
        .output
        .contains("failing(org.example.outputleveltests.SimpleTest)"));

    assert!(result.output.contains("FAILED"));
}

#[test]
fn verbose_mode_reports_everything() {
    let mut config = Configuration::new("org.example.outputleveltests");
    config.verbose = true;
    let result = execute(&config, &FailureHistory::new());

    assert!(result.output.contains("SimpleTest.passing"));
    assert!(result.output.contains("SimpleTest.failing"));

    assert!(result.output.contains("*** TESTS COMPLETE"));
    assert!(result.output.contains("*** 1 passed"));

    assert!(result.output.contains("Failures:"));
    assert!(result
        .output
        .contains("failing(org.example.outputleveltests.SimpleTest)"));
    assert!(result.output.contains("FAILED"));

    // Teed output is forwarded to the terminal, but the captured copy is
    // still stored for downstream stream consumers.
    let captured = &result.captured_out["org.example.outputleveltests.SimpleTest"];
    assert!(captured.contains("Stdout for passing test"));
}

#[test]
fn default_output_replays_captured_streams() {
    let config = Configuration::new("org.example.outputleveltests");
    let result = execute(&config, &FailureHistory::new());

    assert!(result.output.contains("STDOUT:"));
    assert!(result.output.contains("Stdout for failing test"));
    assert!(result.output.contains("Stdout for passing test"));
}

#[test]
fn zero_matches_is_an_empty_successful_request() {
    let config = Configuration::new("org.example.nosuchpackage");
    let result = execute(&config, &FailureHistory::new());
    assert!(result.outcome.stats.is_success());
    assert!(result.outcome.executed.is_empty());
    assert!(result.captured_out.is_empty());
}

#[test]
fn optimizer_filters_the_request_against_the_store() {
    let index = index();
    let mut request = TestSequencer::new()
        .sequence(&index, "org.example.simpletests")
        .unwrap();

    let mut repository = CoverageRepository::new(10);
    let mut wide = BitSet::new(10);
    for bit in 0..8 {
        wide.set(bit);
    }
    let mut narrow = BitSet::new(10);
    narrow.set(9);
    repository.record_coverage("testTrue1(org.example.simpletests.SimpleTest)", wide);
    repository.record_coverage("testTrue2(org.example.simpletests.SimpleTest)", narrow);
    repository.record_cost("testTrue1(org.example.simpletests.SimpleTest)", 10);
    repository.record_cost("testTrue2(org.example.simpletests.SimpleTest)", 10);

    let subset = SubsetOptimizer::new(OptimizeTarget::TestCount(1))
        .filter_request(&mut request, &repository)
        .expect("coverage data is present");

    assert_eq!(
        request.test_ids(),
        vec!["testTrue1(org.example.simpletests.SimpleTest)"]
    );
    assert!(subset.contains("testTrue1(org.example.simpletests.SimpleTest)"));
    assert!(!subset.contains("testTrue2(org.example.simpletests.SimpleTest)"));
}

#[test]
fn optimizer_passes_through_without_coverage_data() {
    let index = index();
    let mut request = TestSequencer::new()
        .sequence(&index, "org.example.simpletests")
        .unwrap();
    let before = request.test_ids();

    let repository = CoverageRepository::new(0);
    let subset =
        SubsetOptimizer::new(OptimizeTarget::Coverage(0.5)).filter_request(&mut request, &repository);

    assert!(subset.is_none());
    assert_eq!(request.test_ids(), before);
}

fn all_prioritisable_ids() -> Vec<String> {
    sequence_ids(
        "org.example.wildcards.include*",
        None,
        &FailureHistory::new(),
    )
}

proptest! {
    // Prioritisation may only permute the sequence, never change its
    // contents.
    #[test]
    fn prioritised_sequence_is_a_permutation(
        history in proptest::collection::btree_map(
            proptest::sample::select(all_prioritisable_ids()),
            0u64..5,
            0..6,
        )
    ) {
        let baseline = sequence_ids(
            "org.example.wildcards.include*",
            None,
            &FailureHistory::new(),
        );
        let prioritised = sequence_ids(
            "org.example.wildcards.include*",
            None,
            &history,
        );

        let mut baseline_sorted = baseline.clone();
        baseline_sorted.sort();
        let mut prioritised_sorted = prioritised.clone();
        prioritised_sorted.sort();
        prop_assert_eq!(baseline_sorted, prioritised_sorted);
        prop_assert_eq!(baseline.len(), prioritised.len());
    }

    // Sharding partitions the class set for any shard count.
    #[test]
    fn sharding_partitions_classes(total in 1u64..8) {
        let all = shard_classes("org.example.wildcards.include*", 0, 1);
        let mut seen = BTreeSet::new();
        let mut count = 0;
        for i in 0..total {
            let classes = shard_classes("org.example.wildcards.include*", i, total);
            count += classes.len();
            seen.extend(classes);
        }
        prop_assert_eq!(&seen, &all);
        prop_assert_eq!(count, all.len());
    }
}
