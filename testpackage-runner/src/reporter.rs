// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Progress reporting and per-test stream bookkeeping.
//!
//! [`RunReporter`] consumes the lifecycle events fired serially by the
//! runner, keeps the run counters, owns the capture cycle around each test,
//! renders colourised progress to its writer, and stores every class's
//! captured output for downstream consumers via [`StreamSource`].
//!
//! Events arrive on a single thread; the reporter does no locking of its
//! own.

use crate::{
    capture::StreamCapture,
    config::Configuration,
    markup,
    runner::RunStats,
    test_list::{TestFailure, TestInstance},
};
use debug_ignore::DebugIgnore;
use std::{
    collections::BTreeMap,
    io::{self, Write},
    time::Duration,
};

const TICK_MARK: &str = "\u{2714}";
const CROSS_MARK: &str = "\u{2718}";

/// Access to the streams captured during the most recent execution of a test
/// in a class. Absent classes yield empty slices.
pub trait StreamSource {
    /// Bytes the class's tests wrote to standard output.
    fn read_out(&self, class_name: &str) -> &[u8];
    /// Bytes the class's tests wrote to standard error.
    fn read_err(&self, class_name: &str) -> &[u8];
}

/// A test lifecycle event, fired by the runner.
#[derive(Debug)]
pub enum TestEvent<'i> {
    /// The run is starting; `test_count` tests are sequenced.
    RunStarted {
        /// Number of tests that will be run.
        test_count: usize,
    },
    /// A test method is about to execute.
    TestStarted {
        /// The test being started.
        instance: TestInstance<'i>,
    },
    /// A test method failed. Fired before its `TestFinished`.
    TestFailed {
        /// The failing test.
        instance: TestInstance<'i>,
        /// Failure details.
        failure: TestFailure,
    },
    /// A test method's assumption did not hold; the test is skipped without
    /// failing the run. Fired before its `TestFinished`.
    TestAssumptionFailed {
        /// The test whose assumption failed.
        instance: TestInstance<'i>,
        /// Why the assumption failed.
        message: String,
    },
    /// An ignored test method; never started.
    TestIgnored {
        /// The ignored test.
        instance: TestInstance<'i>,
    },
    /// A started test method completed (in success or failure).
    TestFinished {
        /// The finished test.
        instance: TestInstance<'i>,
        /// Wall-clock execution time.
        time_taken: Duration,
    },
    /// The run is complete.
    RunFinished,
}

/// The run listener: counters, capture discipline and progress output.
pub struct RunReporter<W> {
    writer: W,
    quiet: bool,
    verbose: bool,
    fail_fast: bool,
    colorize: bool,
    terminal_width: usize,
    test_package_prefixes: Vec<String>,

    total: usize,
    stats: RunStats,
    current_did_fail: bool,
    aborted: bool,
    capture: Option<StreamCapture>,
    failures: Vec<(String, TestFailure)>,

    stdout_store: DebugIgnore<BTreeMap<String, Vec<u8>>>,
    stderr_store: DebugIgnore<BTreeMap<String, Vec<u8>>>,
}

impl<W: Write> RunReporter<W> {
    /// Creates a reporter writing progress to `writer`.
    ///
    /// The writer should reach the terminal even while a capture is active —
    /// the CLI passes [`crate::capture::original_stdout`].
    pub fn new(config: &Configuration, writer: W) -> Self {
        Self {
            writer,
            quiet: config.quiet,
            verbose: config.verbose,
            fail_fast: config.fail_fast,
            colorize: config.colorize,
            terminal_width: config.terminal_width,
            test_package_prefixes: config.test_package_prefixes.clone(),
            total: 0,
            stats: RunStats::default(),
            current_did_fail: false,
            aborted: false,
            capture: None,
            failures: Vec::new(),
            stdout_store: DebugIgnore(BTreeMap::new()),
            stderr_store: DebugIgnore(BTreeMap::new()),
        }
    }

    /// Handles one lifecycle event.
    pub fn report_event(&mut self, event: TestEvent<'_>) -> io::Result<()> {
        match event {
            TestEvent::RunStarted { test_count } => {
                self.total = test_count;
                self.current_did_fail = false;
                Ok(())
            }
            TestEvent::TestStarted { instance } => self.on_test_started(instance),
            TestEvent::TestFailed { instance, failure } => self.on_test_failed(instance, failure),
            TestEvent::TestAssumptionFailed { .. } => {
                self.stats.assumption_failed += 1;
                self.current_did_fail = false;
                Ok(())
            }
            TestEvent::TestIgnored { .. } => {
                self.stats.ignored += 1;
                Ok(())
            }
            TestEvent::TestFinished {
                instance,
                time_taken,
            } => self.on_test_finished(instance, time_taken),
            TestEvent::RunFinished => self.on_run_finished(),
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// True once fail-fast has latched; the runner stops scheduling tests.
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Failures recorded so far, in occurrence order.
    pub fn failures(&self) -> impl Iterator<Item = &(String, TestFailure)> + '_ {
        self.failures.iter()
    }

    /// Consumes the reporter, returning its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn on_test_started(&mut self, instance: TestInstance<'_>) -> io::Result<()> {
        self.stats.started += 1;
        self.current_did_fail = false;

        if !self.quiet && (self.colorize || self.verbose) {
            self.display_placeholder(&instance)?;
        }

        // Tee output when verbose so it appears in real time; otherwise it
        // is replayed after the test finishes.
        let tee = self.verbose && !self.quiet;
        let capture = StreamCapture::grab(tee, &instance.display_name())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        self.capture = Some(capture);
        Ok(())
    }

    fn on_test_failed(
        &mut self,
        instance: TestInstance<'_>,
        failure: TestFailure,
    ) -> io::Result<()> {
        self.current_did_fail = true;
        self.stats.failed += 1;
        self.failures.push((instance.id(), failure));

        if self.fail_fast {
            self.aborted = true;
            writeln!(self.writer)?;
            writeln!(self.writer)?;
            writeln!(self.writer, "*** TESTS ABORTED")?;
            let banner = markup::paint(
                "*** @|bg_red Fail-fast triggered by test failure:|@",
                self.colorize,
            );
            writeln!(self.writer, "{banner}")?;
            let (id, failure) = self.failures.last().expect("failure just recorded").clone();
            self.write_failure_report(&id, &failure)?;
        }
        Ok(())
    }

    fn on_test_finished(
        &mut self,
        instance: TestInstance<'_>,
        time_taken: Duration,
    ) -> io::Result<()> {
        let captured = match self.capture.take() {
            Some(capture) => capture.restore(),
            None => Default::default(),
        };
        self.stdout_store
            .insert(instance.class.name.clone(), captured.stdout.clone());
        self.stderr_store
            .insert(instance.class.name.clone(), captured.stderr.clone());

        if !self.current_did_fail {
            self.stats.run += 1;
            if !self.quiet {
                self.write_result_line(&instance, true, time_taken)?;
            }
        } else {
            // Failing tests are always named, even when quiet.
            self.write_result_line(&instance, false, time_taken)?;
        }

        if !self.quiet && !self.verbose {
            if !captured.stdout.is_empty() {
                writeln!(self.writer, "    STDOUT:")?;
                self.writer.write_all(&captured.stdout)?;
            }
            if !captured.stderr.is_empty() {
                writeln!(self.writer, "\n    STDERR:")?;
                self.writer.write_all(&captured.stderr)?;
            }
        }
        self.writer.flush()
    }

    fn on_run_finished(&mut self) -> io::Result<()> {
        let stats = self.stats;
        let passed = stats.passed();

        writeln!(self.writer)?;
        writeln!(self.writer)?;
        writeln!(self.writer, "*** TESTS COMPLETE")?;

        let passed_statement = if passed > 0 && stats.failed == 0 {
            format!("@|bg_green {passed} passed|@")
        } else {
            format!("{passed} passed")
        };
        let failed_statement = if stats.failed > 0 {
            format!("@|bg_red {} failed|@", stats.failed)
        } else {
            "0 failed".to_owned()
        };
        let ignored_statement = if stats.ignored > 0 && stats.ignored > passed {
            format!("@|bg_red {} ignored|@", stats.ignored)
        } else if stats.ignored > 0 {
            format!("@|bg_yellow {} ignored|@", stats.ignored)
        } else {
            "0 ignored".to_owned()
        };
        let assumption_statement = if stats.assumption_failed > 0 {
            format!(", @|blue {} assumption(s) failed|@", stats.assumption_failed)
        } else {
            String::new()
        };

        let line = markup::paint(
            &format!(
                "*** {passed_statement}, {failed_statement}, {ignored_statement}{assumption_statement}"
            ),
            self.colorize,
        );
        writeln!(self.writer, "{line}")?;

        if stats.failed > 0 && !self.quiet {
            writeln!(self.writer)?;
            writeln!(self.writer, "Failures:")?;
            let failures = self.failures.clone();
            for (id, failure) in &failures {
                self.write_failure_report(id, failure)?;
            }
        }

        let verdict = if stats.failed > 0 {
            "*** @|bold,red FAILED|@"
        } else {
            "*** @|bold,green OK|@"
        };
        writeln!(self.writer, "{}", markup::paint(verdict, self.colorize))?;
        self.writer.flush()
    }

    fn display_placeholder(&mut self, instance: &TestInstance<'_>) -> io::Result<()> {
        if self.colorize {
            write!(self.writer, "{}", markup::SAVE_CURSOR)?;
        }

        let left = format!(">>  {}", instance.display_name());

        let mut overview = format!("[ {}/{} tests run", self.stats.run, self.total);
        if self.stats.ignored > 0 {
            overview.push_str(&format!(", @|yellow {} ignored|@", self.stats.ignored));
        }
        if self.stats.failed > 0 {
            overview.push_str(&format!(", @|red {} failed|@", self.stats.failed));
        }
        overview.push_str(" ] ");

        let line = markup::paint(&self.align_left_right(&left, &overview), self.colorize);
        write!(self.writer, "{line}")?;
        if self.verbose {
            // Teed output should land on the line below; in non-verbose mode
            // the newline is omitted so the placeholder can be erased.
            writeln!(self.writer)?;
        }
        self.writer.flush()
    }

    fn write_result_line(
        &mut self,
        instance: &TestInstance<'_>,
        success: bool,
        time_taken: Duration,
    ) -> io::Result<()> {
        if self.colorize {
            write!(
                self.writer,
                "{}{}",
                markup::ERASE_LINE,
                markup::RESTORE_CURSOR
            )?;
        }
        let (colour, symbol) = if success {
            ("green", TICK_MARK)
        } else {
            ("red", CROSS_MARK)
        };
        let line = markup::paint(
            &format!(
                " @|{colour} {symbol}  {:<30}|@ @|blue ({} ms)|@ ",
                instance.display_name(),
                time_taken.as_millis()
            ),
            self.colorize,
        );
        writeln!(self.writer, "{line}")
    }

    fn write_failure_report(&mut self, id: &str, failure: &TestFailure) -> io::Result<()> {
        let heading = markup::paint(&format!("    @|red {id}|@:"), self.colorize);
        writeln!(self.writer, "{heading}")?;
        let detail = markup::paint(
            &format!(
                "      @|yellow {}: {}|@",
                failure.kind,
                indent_newlines(&failure.message)
            ),
            self.colorize,
        );
        writeln!(self.writer, "{detail}")?;

        if let Some(top) = failure.top_frame() {
            writeln!(self.writer, "             At {top}")?;
        }
        if failure.cause.is_some() {
            let root = failure.root_cause();
            let cause_line = markup::paint(
                &format!(
                    "               Root cause: @|yellow {}: {}|@",
                    root.kind,
                    indent_newlines(&root.message)
                ),
                self.colorize,
            );
            writeln!(self.writer, "{cause_line}")?;
            if let Some(root_top) = root.top_frame() {
                writeln!(self.writer, "             At {root_top}")?;
            }
        }

        if let Some(suspect) = failure.suspect_frame(&self.test_package_prefixes) {
            writeln!(self.writer, "        Suspect {suspect}")?;
            writeln!(self.writer)?;
        }
        self.writer.flush()
    }

    fn align_left_right(&self, left: &str, right: &str) -> String {
        let spaces = if self.terminal_width > 0 {
            let used =
                (markup::visible_width(left) + markup::visible_width(right)) % self.terminal_width;
            self.terminal_width - used
        } else {
            0
        };
        format!("{left}{}{right}", " ".repeat(spaces))
    }
}

impl<W> StreamSource for RunReporter<W> {
    fn read_out(&self, class_name: &str) -> &[u8] {
        self.stdout_store
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn read_err(&self, class_name: &str) -> &[u8] {
        self.stderr_store
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl<W> std::fmt::Debug for RunReporter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunReporter")
            .field("total", &self.total)
            .field("stats", &self.stats)
            .field("aborted", &self.aborted)
            .finish()
    }
}

fn indent_newlines(text: &str) -> String {
    text.replace('\n', "\n      ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CAPTURE_LOCK;
    use crate::test_list::{StackFrame, TestClass, TestMethod, TestOutcome};
    use std::sync::PoisonError;

    fn pass() -> TestOutcome {
        TestOutcome::Passed
    }

    fn config() -> Configuration {
        Configuration::new("org.example")
    }

    struct Fixture {
        class: TestClass,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                class: TestClass::new(
                    "org.example.FooTest",
                    vec![TestMethod::new("testA", pass), TestMethod::new("testB", pass)],
                ),
            }
        }

        fn instance(&self, method: usize) -> TestInstance<'_> {
            TestInstance {
                class: &self.class,
                method: &self.class.methods[method],
            }
        }
    }

    fn run_events(
        config: &Configuration,
        events: impl FnOnce(&mut RunReporter<Vec<u8>>),
    ) -> (RunStats, String) {
        let _guard = CAPTURE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut reporter = RunReporter::new(config, Vec::new());
        events(&mut reporter);
        let stats = reporter.stats();
        let buffer = reporter.into_writer();
        (stats, String::from_utf8_lossy(&buffer).into_owned())
    }

    fn start_finish(reporter: &mut RunReporter<Vec<u8>>, instance: TestInstance<'_>) {
        reporter
            .report_event(TestEvent::TestStarted { instance })
            .unwrap();
        reporter
            .report_event(TestEvent::TestFinished {
                instance,
                time_taken: Duration::from_millis(3),
            })
            .unwrap();
    }

    #[test]
    fn counters_follow_the_event_stream() {
        let fixture = Fixture::new();
        let (stats, output) = run_events(&config(), |reporter| {
            reporter
                .report_event(TestEvent::RunStarted { test_count: 2 })
                .unwrap();
            start_finish(reporter, fixture.instance(0));

            let instance = fixture.instance(1);
            reporter
                .report_event(TestEvent::TestStarted { instance })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFailed {
                    instance,
                    failure: TestFailure::new("AssertionError", "expected true"),
                })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFinished {
                    instance,
                    time_taken: Duration::from_millis(1),
                })
                .unwrap();
            reporter.report_event(TestEvent::RunFinished).unwrap();
        });

        assert_eq!(stats.started, 2);
        assert_eq!(stats.run, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.started - stats.failed, stats.run);
        assert!(output.contains("*** TESTS COMPLETE"));
        assert!(output.contains("*** 1 passed, 1 failed, 0 ignored"));
        assert!(output.contains("Failures:"));
        assert!(output.contains("AssertionError: expected true"));
        assert!(output.contains("FAILED"));
    }

    #[test]
    fn quiet_suppresses_failures_section_but_not_summary() {
        let fixture = Fixture::new();
        let mut quiet_config = config();
        quiet_config.quiet = true;

        let (_, output) = run_events(&quiet_config, |reporter| {
            reporter
                .report_event(TestEvent::RunStarted { test_count: 1 })
                .unwrap();
            let instance = fixture.instance(0);
            reporter
                .report_event(TestEvent::TestStarted { instance })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFailed {
                    instance,
                    failure: TestFailure::new("AssertionError", "nope"),
                })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFinished {
                    instance,
                    time_taken: Duration::from_millis(1),
                })
                .unwrap();
            reporter.report_event(TestEvent::RunFinished).unwrap();
        });

        assert!(output.contains("*** TESTS COMPLETE"));
        assert!(!output.contains("Failures:"));
        // The failing test is still named, even in quiet mode.
        assert!(output.contains("FooTest.testA"));
        assert!(output.contains("FAILED"));
    }

    #[test]
    fn assumption_failures_do_not_fail_the_run() {
        let fixture = Fixture::new();
        let (stats, output) = run_events(&config(), |reporter| {
            reporter
                .report_event(TestEvent::RunStarted { test_count: 1 })
                .unwrap();
            let instance = fixture.instance(0);
            reporter
                .report_event(TestEvent::TestStarted { instance })
                .unwrap();
            reporter
                .report_event(TestEvent::TestAssumptionFailed {
                    instance,
                    message: "db offline".to_owned(),
                })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFinished {
                    instance,
                    time_taken: Duration::from_millis(1),
                })
                .unwrap();
            reporter.report_event(TestEvent::RunFinished).unwrap();
        });

        assert_eq!(stats.assumption_failed, 1);
        assert_eq!(stats.run, 1);
        assert_eq!(stats.passed(), 0);
        assert!(output.contains("1 assumption(s) failed"));
        assert!(output.contains("OK"));
    }

    #[test]
    fn fail_fast_prints_abort_banner_and_latches() {
        let fixture = Fixture::new();
        let mut ff_config = config();
        ff_config.fail_fast = true;

        let (_, output) = run_events(&ff_config, |reporter| {
            reporter
                .report_event(TestEvent::RunStarted { test_count: 2 })
                .unwrap();
            let instance = fixture.instance(0);
            reporter
                .report_event(TestEvent::TestStarted { instance })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFailed {
                    instance,
                    failure: TestFailure::new("AssertionError", "boom"),
                })
                .unwrap();
            assert!(reporter.aborted());
            reporter
                .report_event(TestEvent::TestFinished {
                    instance,
                    time_taken: Duration::from_millis(1),
                })
                .unwrap();
        });

        assert!(output.contains("*** TESTS ABORTED"));
        assert!(output.contains("Fail-fast triggered by test failure:"));
    }

    #[test]
    fn failure_report_includes_root_cause_and_suspect() {
        let fixture = Fixture::new();
        let failure = TestFailure::new("WrapperError", "outer message")
            .with_frames(vec![
                StackFrame::new("org.lib.Caller", "org.lib.Caller.call(Caller:3)"),
                StackFrame::new("org.example.FooTest", "org.example.FooTest.testA(FooTest:11)"),
            ])
            .with_cause(
                TestFailure::new("IoError", "disk\nfull").with_frames(vec![StackFrame::new(
                    "org.lib.Disk",
                    "org.lib.Disk.write(Disk:99)",
                )]),
            );

        let (_, output) = run_events(&config(), |reporter| {
            reporter
                .report_event(TestEvent::RunStarted { test_count: 1 })
                .unwrap();
            let instance = fixture.instance(1);
            reporter
                .report_event(TestEvent::TestStarted { instance })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFailed { instance, failure })
                .unwrap();
            reporter
                .report_event(TestEvent::TestFinished {
                    instance,
                    time_taken: Duration::from_millis(1),
                })
                .unwrap();
            reporter.report_event(TestEvent::RunFinished).unwrap();
        });

        assert!(output.contains("WrapperError: outer message"));
        assert!(output.contains("At org.lib.Caller.call(Caller:3)"));
        assert!(output.contains("Root cause: IoError: disk\n      full"));
        assert!(output.contains("At org.lib.Disk.write(Disk:99)"));
        assert!(output.contains("Suspect org.example.FooTest.testA(FooTest:11)"));
    }

    #[test]
    fn stream_source_yields_empty_for_unknown_classes() {
        let fixture = Fixture::new();
        let _guard = CAPTURE_LOCK
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut reporter = RunReporter::new(&config(), Vec::new());
        reporter
            .report_event(TestEvent::RunStarted { test_count: 1 })
            .unwrap();
        let instance = fixture.instance(0);
        reporter
            .report_event(TestEvent::TestStarted { instance })
            .unwrap();
        reporter
            .report_event(TestEvent::TestFinished {
                instance,
                time_taken: Duration::from_millis(1),
            })
            .unwrap();

        assert_eq!(reporter.read_out("org.example.FooTest"), b"");
        assert_eq!(reporter.read_out("org.example.Unknown"), b"");
        assert_eq!(reporter.read_err("org.example.Unknown"), b"");
    }
}
