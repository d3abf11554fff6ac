// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A sample suite demonstrating the harness.
//!
//! Run it with a selector, for example:
//!
//! ```sh
//! sample-tests org.example.simpletests
//! sample-tests 'org.example.wildcards.include*' --shard 0/2
//! sample-tests org.example.outputleveltests --verbose
//! ```

use std::io::Write;
use testpackage_runner::test_list::{TestClass, TestFailure, TestIndex, TestMethod, TestOutcome};

fn passes() -> TestOutcome {
    TestOutcome::Passed
}

fn passes_noisily() -> TestOutcome {
    let _ = writeln!(std::io::stdout(), "Stdout for passing test");
    TestOutcome::Passed
}

fn fails_noisily() -> TestOutcome {
    let _ = writeln!(std::io::stdout(), "Stdout for failing test");
    TestOutcome::Failed(TestFailure::new("AssertionError", "expected condition to hold"))
}

fn fails() -> TestOutcome {
    TestOutcome::Failed(TestFailure::new("AssertionError", "deliberate failure"))
}

fn simple_class(name: &str) -> TestClass {
    TestClass::new(
        name,
        vec![
            TestMethod::new("testTrue1", passes),
            TestMethod::new("testTrue2", passes),
        ],
    )
}

fn index() -> TestIndex {
    TestIndex::new(vec![
        simple_class("org.example.simpletests.SimpleTest"),
        simple_class("org.example.wildcards.SimpleTest"),
        simple_class("org.example.wildcards.include1.SimpleTest"),
        simple_class("org.example.wildcards.include1.includesub1.SimpleTest"),
        simple_class("org.example.wildcards.include1.includesub2.SimpleTest"),
        simple_class("org.example.wildcards.include2.SimpleTest"),
        TestClass::new(
            "org.example.failureprioritisationtests.aaa_NoRecentFailuresTest",
            vec![TestMethod::new("testTrue", passes)],
        ),
        TestClass::new(
            "org.example.failureprioritisationtests.zzz_JustFailedTest",
            vec![
                TestMethod::new("testThatHasNotFailed", passes),
                TestMethod::new("testTrue", passes),
            ],
        ),
        TestClass::new(
            "org.example.shardingtests.FirstTest",
            vec![
                TestMethod::new("testA", passes),
                TestMethod::new("testB", passes),
            ],
        ),
        TestClass::new(
            "org.example.shardingtests.SecondTest",
            vec![
                TestMethod::new("testA", passes),
                TestMethod::new("testB", passes),
            ],
        ),
        TestClass::new(
            "org.example.shardingtests.ThirdTest",
            vec![
                TestMethod::new("testA", passes),
                TestMethod::new("testB", passes),
            ],
        ),
        TestClass::new(
            "org.example.failfasttests.aaa_FailingTest",
            vec![TestMethod::new("testFails", fails)],
        ),
        TestClass::new(
            "org.example.failfasttests.zzz_PassingTest",
            vec![TestMethod::new("testPasses", passes)],
        ),
        TestClass::new(
            "org.example.outputleveltests.SimpleTest",
            vec![
                TestMethod::new("failing", fails_noisily),
                TestMethod::new("passing", passes_noisily),
            ],
        ),
    ])
}

testpackage::harness!(index());
