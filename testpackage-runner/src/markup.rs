// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inline colour markup of the form `@|style text|@`.
//!
//! Style tokens (`red`, `bg_green`, `bold`, ...) may be combined with commas:
//! `@|bold,red FAILED|@`. Expansion maps tokens onto [`owo_colors::Style`];
//! stripping removes the markers so that width calculations see only the
//! visible characters.

use owo_colors::{OwoColorize, Style};

/// ANSI save-cursor sequence, printed before a progress placeholder.
pub const SAVE_CURSOR: &str = "\x1b[s";
/// ANSI restore-cursor sequence, printed when replacing a placeholder.
pub const RESTORE_CURSOR: &str = "\x1b[u";
/// ANSI erase-entire-line sequence.
pub const ERASE_LINE: &str = "\x1b[2K";

/// Renders `input`, expanding markup to escape sequences when `colorize` is
/// true and stripping it otherwise.
pub fn paint(input: &str, colorize: bool) -> String {
    if colorize {
        expand(input)
    } else {
        strip(input)
    }
}

/// Expands every `@|styles text|@` region into ANSI escape sequences.
///
/// Unknown style tokens are ignored; an unterminated region is passed through
/// verbatim.
pub fn expand(input: &str) -> String {
    render(input, true)
}

/// Removes markup markers, leaving only the visible text.
pub fn strip(input: &str) -> String {
    render(input, false)
}

/// The number of visible characters in `input` once markup is stripped.
pub fn visible_width(input: &str) -> usize {
    strip(input).chars().count()
}

fn render(input: &str, colorize: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("@|") {
        out.push_str(&rest[..start]);
        let region = &rest[start + 2..];

        let Some((tokens, after_tokens)) = region.split_once(' ') else {
            // No style/text separator: not markup.
            out.push_str(&rest[start..]);
            return out;
        };
        let Some((text, tail)) = after_tokens.split_once("|@") else {
            out.push_str(&rest[start..]);
            return out;
        };

        if colorize {
            let style = parse_style(tokens);
            out.push_str(&format!("{}", text.style(style)));
        } else {
            out.push_str(text);
        }
        rest = tail;
    }

    out.push_str(rest);
    out
}

fn parse_style(tokens: &str) -> Style {
    let mut style = Style::new();
    for token in tokens.split(',') {
        style = match token {
            "red" => style.red(),
            "green" => style.green(),
            "yellow" => style.yellow(),
            "blue" => style.blue(),
            "bg_red" => style.on_red(),
            "bg_green" => style.on_green(),
            "bg_yellow" => style.on_yellow(),
            "bold" => style.bold(),
            _ => style,
        };
    }
    style
}
