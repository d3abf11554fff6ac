// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing and the orchestration pipeline.

use crate::{
    errors::ExpectedError,
    output::{OutputContext, OutputOpts},
};
use camino::Utf8PathBuf;
use clap::Parser;
use console::Term;
use testpackage_runner::{
    capture::original_stdout,
    config::Configuration,
    coverage::{CoverageRepository, DEFAULT_STORE_DIR},
    errors::ConfigError,
    optimizer::{OptimizeTarget, SubsetOptimizer},
    partition::ShardAssignment,
    reporter::RunReporter,
    runner::TestRunner,
    sequencer::TestSequencer,
    test_list::{OutputFormat, TestIndex},
};

/// Runs a package of tests with coverage-guided sequencing and optimization.
#[derive(Debug, Parser)]
#[command(name = "testpackage", version, about)]
pub struct App {
    /// Test package selector, e.g. org.example.mytests or org.example.include*
    ///
    /// Falls back to the `package` environment variable when omitted.
    #[arg(value_name = "PATTERN", env = "package")]
    pattern: Option<String>,

    /// Test package selector (alternative to the positional form)
    #[arg(long = "package", value_name = "PATTERN")]
    package: Option<String>,

    #[clap(flatten)]
    output: OutputOpts,

    /// Abort the run on the first test failure
    #[arg(long)]
    fail_fast: bool,

    /// Run only one shard of the test classes, e.g. 0/3
    #[arg(long, value_name = "I/N")]
    shard: Option<ShardAssignment>,

    /// Select the quickest subset reaching this coverage fraction, in (0, 1]
    #[arg(long, value_name = "FRACTION")]
    optimize_coverage: Option<f64>,

    /// Select the best-coverage subset within this budget, in milliseconds
    #[arg(long, value_name = "MILLIS")]
    optimize_runtime: Option<u64>,

    /// Coverage store directory
    #[arg(long, value_name = "DIR", default_value = DEFAULT_STORE_DIR)]
    store_dir: Utf8PathBuf,

    /// List the sequenced tests instead of running them
    #[arg(long)]
    list: bool,

    /// Output format for --list
    #[arg(short = 'T', long, value_name = "FORMAT", default_value_t)]
    format: OutputFormat,
}

impl App {
    /// Executes the invocation against the given test index.
    pub fn exec(self, index: &TestIndex) -> Result<(), ExpectedError> {
        let output = self.output.init();
        let config = self
            .build_configuration(output)
            .map_err(ExpectedError::config)?;

        let mut repository =
            CoverageRepository::load(&config.store_dir).map_err(ExpectedError::store)?;

        let sequencer = match config.shard {
            Some(shard) => TestSequencer::with_shard(shard),
            None => TestSequencer::new(),
        };
        let mut request = sequencer
            .sequence_with_history(index, &config.pattern, repository.failure_history())
            .map_err(|err| ExpectedError::config(err.into()))?;

        if request.is_empty() {
            log::warn!("pattern '{}' matched no tests", config.pattern);
        }

        if self.list {
            let stdout = std::io::stdout();
            return request
                .write(self.format, config.colorize, stdout.lock())
                .map_err(ExpectedError::report);
        }

        if let Some(target) = config.optimize_target {
            SubsetOptimizer::new(target).filter_request(&mut request, &repository);
        }

        let terminal = original_stdout().map_err(ExpectedError::report)?;
        let mut reporter = RunReporter::new(&config, terminal);
        let outcome = TestRunner::new(request)
            .execute(&mut reporter)
            .map_err(ExpectedError::report)?;

        repository.record_run(
            outcome
                .executed
                .iter()
                .map(|test| (test.id.as_str(), test.elapsed_millis, test.failed)),
        );
        if let Err(err) = repository.save(&config.store_dir) {
            // A failed save must not override the run's verdict.
            log::error!("failed to persist the coverage store: {err}");
        }

        if outcome.stats.is_success() {
            Ok(())
        } else {
            Err(ExpectedError::TestRunFailed)
        }
    }

    fn build_configuration(&self, output: OutputContext) -> Result<Configuration, ConfigError> {
        let pattern = self
            .package
            .clone()
            .or_else(|| self.pattern.clone())
            .unwrap_or_default();

        let mut config = Configuration::new(pattern);
        config.quiet = output.quiet;
        config.verbose = output.verbose;
        config.fail_fast = self.fail_fast;
        config.shard = self.shard;
        config.store_dir = self.store_dir.clone();
        config.colorize = output.color.should_colorize(supports_color::Stream::Stdout);
        config.terminal_width = Term::stdout()
            .size_checked()
            .map_or(0, |(_rows, cols)| cols as usize);

        config.optimize_target = match (self.optimize_coverage, self.optimize_runtime) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingOptimizerTargets),
            (Some(fraction), None) => Some(OptimizeTarget::Coverage(fraction)),
            (None, Some(millis)) => Some(OptimizeTarget::CostMillis(millis)),
            (None, None) => None,
        };

        config.validate()?;
        Ok(config)
    }
}
