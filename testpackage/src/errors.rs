// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expected failure modes and their exit codes.

use std::{error, fmt};
use testpackage_runner::errors::{ConfigError, StoreError};

/// Documented exit codes for `testpackage` invocations.
pub enum TestPackageExitCode {}

impl TestPackageExitCode {
    /// Every selected test passed, or none were selected.
    pub const OK: i32 = 0;

    /// At least one test failed.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// A configuration or coverage-store problem prevented the run.
    pub const SETUP_ERROR: i32 = 2;
}

/// An error with a well-defined exit code, as opposed to a bug in the
/// orchestrator itself.
#[derive(Debug)]
#[doc(hidden)]
pub enum ExpectedError {
    /// Flag validation or selector parsing failed.
    Config {
        /// The underlying configuration error.
        err: ConfigError,
    },
    /// The coverage store could not be loaded.
    Store {
        /// The underlying store error.
        err: StoreError,
    },
    /// Progress output could not be written.
    Report {
        /// The underlying IO error.
        err: std::io::Error,
    },
    /// At least one test failed. The reporter has already said so.
    TestRunFailed,
}

impl ExpectedError {
    pub(crate) fn config(err: ConfigError) -> Self {
        Self::Config { err }
    }

    pub(crate) fn store(err: StoreError) -> Self {
        Self::Store { err }
    }

    pub(crate) fn report(err: std::io::Error) -> Self {
        Self::Report { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::Store { .. } => TestPackageExitCode::SETUP_ERROR,
            Self::Report { .. } | Self::TestRunFailed => TestPackageExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays the error (and its cause chain) on stderr.
    pub fn display_to_stderr(&self) {
        match self {
            Self::Config { err } => log::error!("{err}"),
            Self::Store { err } => {
                log::error!("{err}");
                let mut source = error::Error::source(err);
                while let Some(err) = source {
                    log::error!("  caused by: {err}");
                    source = err.source();
                }
            }
            Self::Report { err } => log::error!("failed to write test output: {err}"),
            Self::TestRunFailed => {
                // The reporter's summary already tells the story.
            }
        }
    }
}

impl fmt::Display for ExpectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { err } => write!(f, "{err}"),
            Self::Store { err } => write!(f, "{err}"),
            Self::Report { err } => write!(f, "failed to write test output: {err}"),
            Self::TestRunFailed => write!(f, "test run failed"),
        }
    }
}

impl error::Error for ExpectedError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Config { err } => Some(err),
            Self::Store { err } => Some(err),
            Self::Report { err } => Some(err),
            Self::TestRunFailed => None,
        }
    }
}
