// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serial execution of a sequenced request.
//!
//! The runner walks the request in order on a single thread, firing
//! lifecycle events at the reporter around each test method. Panics inside a
//! test are caught and scored as failures. Fail-fast is a one-way latch
//! owned by the reporter: once it trips, the remaining tests are drained
//! without further events.

use crate::{
    reporter::{RunReporter, TestEvent},
    test_list::{TestFailure, TestFn, TestInstance, TestOutcome, TestRequest},
};
use std::{any::Any, io, io::Write, panic, time::Instant};

/// Statistics for a test run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// Tests that were started.
    pub started: usize,
    /// Tests that ran to completion without failing (assumption failures
    /// included).
    pub run: usize,
    /// Tests that failed.
    pub failed: usize,
    /// Tests that were ignored and never started.
    pub ignored: usize,
    /// Tests whose assumptions did not hold.
    pub assumption_failed: usize,
}

impl RunStats {
    /// Tests that genuinely passed. Never negative.
    pub fn passed(&self) -> usize {
        self.run.saturating_sub(self.assumption_failed)
    }

    /// Returns true if this run is considered a success.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Per-test record of a completed run, folded into the coverage store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutedTest {
    /// Canonical `method(Class)` id.
    pub id: String,
    /// Observed wall-clock cost in milliseconds.
    pub elapsed_millis: u64,
    /// Whether the test failed.
    pub failed: bool,
}

/// Everything the orchestrator needs after a run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// Final counters.
    pub stats: RunStats,
    /// Every test that was actually executed, in order.
    pub executed: Vec<ExecutedTest>,
}

/// Executes a [`TestRequest`] serially.
#[derive(Debug)]
pub struct TestRunner<'i> {
    request: TestRequest<'i>,
}

impl<'i> TestRunner<'i> {
    /// Creates a runner over the given request.
    pub fn new(request: TestRequest<'i>) -> Self {
        Self { request }
    }

    /// Runs every sequenced test, reporting events as they happen.
    pub fn execute<W: Write>(&self, reporter: &mut RunReporter<W>) -> io::Result<RunOutcome> {
        reporter.report_event(TestEvent::RunStarted {
            test_count: self.request.test_count(),
        })?;

        let mut executed = Vec::new();
        'run: for requested in self.request.classes() {
            for &method in &requested.methods {
                if reporter.aborted() {
                    break 'run;
                }
                let instance = TestInstance {
                    class: requested.class,
                    method,
                };

                if method.ignored {
                    reporter.report_event(TestEvent::TestIgnored { instance })?;
                    continue;
                }

                reporter.report_event(TestEvent::TestStarted { instance })?;
                let started = Instant::now();
                let outcome = run_catching(method.test_fn);
                let time_taken = started.elapsed();

                let failed = matches!(outcome, TestOutcome::Failed(_));
                match outcome {
                    TestOutcome::Passed => {}
                    TestOutcome::Failed(failure) => {
                        reporter.report_event(TestEvent::TestFailed { instance, failure })?;
                    }
                    TestOutcome::AssumptionFailed(message) => {
                        reporter
                            .report_event(TestEvent::TestAssumptionFailed { instance, message })?;
                    }
                }
                reporter.report_event(TestEvent::TestFinished {
                    instance,
                    time_taken,
                })?;

                executed.push(ExecutedTest {
                    id: instance.id(),
                    elapsed_millis: time_taken.as_millis() as u64,
                    failed,
                });
            }
        }

        reporter.report_event(TestEvent::RunFinished)?;
        Ok(RunOutcome {
            stats: reporter.stats(),
            executed,
        })
    }
}

fn run_catching(test_fn: TestFn) -> TestOutcome {
    match panic::catch_unwind(test_fn) {
        Ok(outcome) => outcome,
        Err(payload) => TestOutcome::Failed(TestFailure::new("panic", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked".to_owned()
    }
}
