// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the runner.

use crate::{partition::ShardParseError, selector::SelectorParseError};
use camino::Utf8PathBuf;
use std::{error, fmt, io};

/// A user-facing configuration problem. Surfaced before any test runs and
/// mapped to the configuration exit code by the CLI.
#[derive(Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// `--quiet` and `--verbose` were both set.
    QuietAndVerbose,
    /// More than one optimizer target was configured.
    ConflictingOptimizerTargets,
    /// No selector pattern was given on the CLI or via the environment.
    MissingPattern,
    /// The coverage target is outside `(0, 1]`.
    InvalidCoverageTarget(f64),
    /// The selector pattern failed to parse.
    Selector(SelectorParseError),
    /// The shard assignment failed to parse.
    Shard(ShardParseError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::QuietAndVerbose => {
                write!(f, "Quiet and Verbose flags cannot be used simultaneously")
            }
            ConfigError::ConflictingOptimizerTargets => write!(
                f,
                "--optimize-coverage and --optimize-runtime cannot be used simultaneously"
            ),
            ConfigError::MissingPattern => write!(
                f,
                "no test package selector given (pass a pattern or set the 'package' environment variable)"
            ),
            ConfigError::InvalidCoverageTarget(target) => {
                write!(f, "coverage target {target} must be within (0, 1]")
            }
            ConfigError::Selector(err) => write!(f, "{err}"),
            ConfigError::Shard(err) => write!(f, "{err}"),
        }
    }
}

impl error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ConfigError::Selector(err) => Some(err),
            ConfigError::Shard(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SelectorParseError> for ConfigError {
    fn from(err: SelectorParseError) -> Self {
        ConfigError::Selector(err)
    }
}

impl From<ShardParseError> for ConfigError {
    fn from(err: ShardParseError) -> Self {
        ConfigError::Shard(err)
    }
}

/// An error that occurs while loading or saving the coverage store.
///
/// Integrity errors are fatal: a store that cannot be trusted must not feed
/// the optimizer or the sequencer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Error reading a store file.
    #[error("failed to read coverage store file at {path}")]
    Read {
        /// The file that failed to be read.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: io::Error,
    },

    /// Error writing a store file.
    #[error("failed to write coverage store file at {path}")]
    Write {
        /// The file that failed to be written.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: io::Error,
    },

    /// Error creating the store directory.
    #[error("failed to create coverage store directory {path}")]
    CreateDir {
        /// The directory that failed to be created.
        path: Utf8PathBuf,
        /// The underlying IO error.
        #[source]
        error: io::Error,
    },

    /// A persisted record is malformed or has the wrong bitmap width.
    #[error("corrupt coverage store file at {path}: {message}")]
    Integrity {
        /// The corrupt file.
        path: Utf8PathBuf,
        /// What was wrong with it.
        message: String,
    },
}

/// An error raised by the stream-capture machinery.
///
/// `AlreadyActive` indicates a programming bug (a `grab` without a matching
/// `restore`) and is treated as fatal.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// A capture was requested while another capture is active.
    #[error("stream capture is already active; nested captures are not supported")]
    AlreadyActive,

    /// Redirecting the standard streams failed.
    #[error("failed to redirect standard streams")]
    Io(#[from] io::Error),
}
