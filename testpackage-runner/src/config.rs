// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run configuration.

use crate::{
    coverage::DEFAULT_STORE_DIR, errors::ConfigError, optimizer::OptimizeTarget,
    partition::ShardAssignment,
};
use camino::Utf8PathBuf;

/// Everything the orchestrator needs to know about a run.
///
/// Built by the CLI from flags and the environment; library consumers can
/// construct it directly.
#[derive(Clone, Debug)]
pub struct Configuration {
    /// The package selector pattern.
    pub pattern: String,
    /// Suppress per-test progress output.
    pub quiet: bool,
    /// Tee captured test output through in real time.
    pub verbose: bool,
    /// Abort the run on the first failure.
    pub fail_fast: bool,
    /// Restrict the run to one shard of the class set.
    pub shard: Option<ShardAssignment>,
    /// Optimizer target; `None` disables subset optimization.
    pub optimize_target: Option<OptimizeTarget>,
    /// Coverage store directory.
    pub store_dir: Utf8PathBuf,
    /// Package prefixes considered "our code" when picking the suspect frame
    /// of a failure report.
    pub test_package_prefixes: Vec<String>,
    /// Terminal width for right-aligned progress output; 0 disables padding.
    pub terminal_width: usize,
    /// Whether to emit ANSI styling and cursor control.
    pub colorize: bool,
}

impl Configuration {
    /// Creates a configuration with defaults for everything but the pattern.
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let test_package_prefixes = vec![literal_prefix(&pattern)];
        Self {
            pattern,
            quiet: false,
            verbose: false,
            fail_fast: false,
            shard: None,
            optimize_target: None,
            store_dir: DEFAULT_STORE_DIR.into(),
            test_package_prefixes,
            terminal_width: 0,
            colorize: false,
        }
    }

    /// Checks cross-flag consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quiet && self.verbose {
            return Err(ConfigError::QuietAndVerbose);
        }
        if self.pattern.is_empty() {
            return Err(ConfigError::MissingPattern);
        }
        if let Some(OptimizeTarget::Coverage(fraction)) = self.optimize_target {
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(ConfigError::InvalidCoverageTarget(fraction));
            }
        }
        Ok(())
    }
}

/// The leading wildcard-free portion of a pattern, used as the default
/// suspect-frame prefix.
fn literal_prefix(pattern: &str) -> String {
    pattern
        .split('.')
        .take_while(|segment| !segment.contains('*'))
        .collect::<Vec<_>>()
        .join(".")
}
