// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `harness!` macro.

/// Generates `fn main()` for a test binary.
///
/// The expression evaluates to the binary's
/// [`TestIndex`](testpackage_runner::test_list::TestIndex) — typically a
/// build-generated table of the compiled test classes. The generated main
/// parses the CLI, runs the orchestration pipeline against the index and
/// exits with the documented exit code.
///
/// ```ignore
/// fn index() -> testpackage_runner::test_list::TestIndex {
///     // enumerate test classes here
/// #   testpackage_runner::test_list::TestIndex::default()
/// }
///
/// testpackage::harness!(index());
/// ```
#[macro_export]
macro_rules! harness {
    ($index:expr) => {
        fn main() {
            let index = $index;
            ::std::process::exit($crate::run_with_index(&index));
        }
    };
}
