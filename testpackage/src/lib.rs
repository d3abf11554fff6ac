// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI surface and harness for the `testpackage` runner.
//!
//! Test binaries declare their index and let [`harness!`] generate `main`:
//! the macro hands the index to [`run_with_index`], which parses arguments,
//! drives the selector → sequencer → optimizer → runner pipeline from
//! [`testpackage_runner`], and returns the process exit code.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod macros;
mod output;

pub use dispatch::App;
pub use errors::{ExpectedError, TestPackageExitCode};
pub use output::{Color, OutputContext, OutputOpts};

use clap::Parser;
use testpackage_runner::test_list::TestIndex;

/// Parses the CLI and runs it against `index`, returning the exit code.
pub fn run_with_index(index: &TestIndex) -> i32 {
    let app = App::parse();
    match app.exec(index) {
        Ok(()) => TestPackageExitCode::OK,
        Err(err) => {
            err.display_to_stderr();
            err.process_exit_code()
        }
    }
}
