// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Output-level flags, colour handling and logger bootstrap.

use clap::{Args, ValueEnum};
use env_logger::fmt::Formatter;
use log::{Level, Record};
use owo_colors::{OwoColorize, Style};
use std::io::Write;
use supports_color::Stream;

/// `--quiet` / `--verbose` / `--color`, shared by every invocation.
#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub struct OutputOpts {
    /// Suppress per-test progress output
    #[arg(long, short)]
    pub quiet: bool,

    /// Show captured test output in real time
    #[arg(long, short)]
    pub verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(long, value_enum, default_value_t, value_name = "WHEN")]
    pub color: Color,
}

impl OutputOpts {
    /// Applies the colour override and initializes logging.
    pub fn init(self) -> OutputContext {
        let OutputOpts {
            quiet,
            verbose,
            color,
        } = self;

        color.init();

        OutputContext {
            quiet,
            verbose,
            color,
        }
    }
}

/// The resolved output settings.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    /// Suppress per-test progress output.
    pub quiet: bool,
    /// Show captured test output in real time.
    pub verbose: bool,
    /// Colour mode.
    pub color: Color,
}

/// Colour mode.
#[derive(Copy, Clone, Debug, Default, PartialEq, ValueEnum)]
#[must_use]
pub enum Color {
    /// Colorize when the stream is a terminal.
    #[default]
    Auto,
    /// Always colorize.
    Always,
    /// Never colorize.
    Never,
}

impl Color {
    fn init(self) {
        match self {
            Color::Auto => owo_colors::unset_override(),
            Color::Always => owo_colors::set_override(true),
            Color::Never => owo_colors::set_override(false),
        }

        // try_init: harness users may have initialized logging themselves.
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().filter_or("TESTPACKAGE_LOG", "info"),
        )
        .format(format_fn)
        .try_init();
    }

    /// Whether output to `stream` should carry ANSI styling.
    pub fn should_colorize(self, stream: Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

fn format_fn(f: &mut Formatter, record: &Record<'_>) -> std::io::Result<()> {
    use owo_colors::Stream::Stderr;

    match record.level() {
        Level::Error => writeln!(
            f,
            "{}: {}",
            "error".if_supports_color(Stderr, |s| s.style(Style::new().bold().red())),
            record.args()
        ),
        Level::Warn => writeln!(
            f,
            "{}: {}",
            "warning".if_supports_color(Stderr, |s| s.style(Style::new().bold().yellow())),
            record.args()
        ),
        Level::Info => writeln!(
            f,
            "{}: {}",
            "info".if_supports_color(Stderr, |s| s.bold()),
            record.args()
        ),
        Level::Debug => writeln!(
            f,
            "{}: {}",
            "debug".if_supports_color(Stderr, |s| s.bold()),
            record.args()
        ),
        _other => Ok(()),
    }
}
