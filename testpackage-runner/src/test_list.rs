// Copyright (c) The testpackage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The static test index and the ordered execution request built from it.
//!
//! Discovery is fed by a pre-generated index: a build step (or the `harness!`
//! macro in the CLI crate) enumerates test classes into a [`TestIndex`]
//! rather than relying on runtime reflection. The selector and sequencer
//! operate purely on the string identifiers recorded here.

use crate::markup;
use serde::Serialize;
use std::{collections::BTreeMap, fmt, io, io::Write, str::FromStr};

/// The outcome of invoking a single test method.
#[derive(Clone, Debug)]
pub enum TestOutcome {
    /// The method ran to completion.
    Passed,
    /// The method failed an assertion or otherwise errored.
    Failed(TestFailure),
    /// A precondition for the method did not hold; counted separately from
    /// failures and does not fail the run.
    AssumptionFailed(String),
}

/// A test method body.
pub type TestFn = fn() -> TestOutcome;

/// One element of a failure's stack trace.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackFrame {
    /// Fully qualified name of the class the frame belongs to.
    pub class_name: String,
    /// Rendered form, e.g. `org.example.FooTest.testBar(FooTest:42)`.
    pub rendered: String,
}

impl StackFrame {
    /// Creates a frame from its owning class and rendered form.
    pub fn new(class_name: impl Into<String>, rendered: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            rendered: rendered.into(),
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rendered)
    }
}

/// A failure raised by a test method, with an optional causal chain.
#[derive(Clone, Debug)]
pub struct TestFailure {
    /// Short failure kind, e.g. `AssertionError` or `panic`.
    pub kind: String,
    /// Failure message; may span multiple lines.
    pub message: String,
    /// Stack trace, most recent frame first. May be empty.
    pub frames: Vec<StackFrame>,
    /// The underlying cause, if distinct from this failure.
    pub cause: Option<Box<TestFailure>>,
}

impl TestFailure {
    /// Creates a failure with no trace and no cause.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            frames: Vec::new(),
            cause: None,
        }
    }

    /// Attaches a stack trace, most recent frame first.
    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Attaches an underlying cause.
    pub fn with_cause(mut self, cause: TestFailure) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Follows the causal chain to its last element.
    pub fn root_cause(&self) -> &TestFailure {
        let mut cause = self;
        while let Some(next) = cause.cause.as_deref() {
            cause = next;
        }
        cause
    }

    /// The most recent frame of this failure, if a trace was recorded.
    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.frames.first()
    }

    /// The deepest frame anywhere in the causal chain whose class belongs to
    /// one of `prefixes`. This is the frame most likely to identify the test
    /// code responsible for the failure.
    pub fn suspect_frame(&self, prefixes: &[String]) -> Option<&StackFrame> {
        if prefixes.is_empty() {
            return None;
        }
        let mut suspect = None;
        let mut failure = Some(self);
        while let Some(current) = failure {
            for frame in &current.frames {
                if prefixes.iter().any(|p| frame.class_name.starts_with(p)) {
                    suspect = Some(frame);
                }
            }
            failure = current.cause.as_deref();
        }
        suspect
    }
}

/// A single test method within a class.
#[derive(Clone)]
pub struct TestMethod {
    /// Method name, unique within its class.
    pub name: String,
    /// Ignored methods are counted but never started.
    pub ignored: bool,
    /// The method body.
    pub test_fn: TestFn,
}

impl TestMethod {
    /// Creates a runnable test method.
    pub fn new(name: impl Into<String>, test_fn: TestFn) -> Self {
        Self {
            name: name.into(),
            ignored: false,
            test_fn,
        }
    }

    /// Creates an ignored test method.
    pub fn ignored(name: impl Into<String>, test_fn: TestFn) -> Self {
        Self {
            name: name.into(),
            ignored: true,
            test_fn,
        }
    }
}

impl fmt::Debug for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethod")
            .field("name", &self.name)
            .field("ignored", &self.ignored)
            .finish()
    }
}

/// A test class in the index.
#[derive(Clone, Debug)]
pub struct TestClass {
    /// Fully qualified, dot-separated class name.
    pub name: String,
    /// Whether the underlying framework considers this class executable.
    /// Abstract and non-test classes carry `false` and are skipped silently.
    pub runnable: bool,
    /// The class's test methods, in declaration order.
    pub methods: Vec<TestMethod>,
}

impl TestClass {
    /// Creates a runnable test class.
    pub fn new(name: impl Into<String>, methods: Vec<TestMethod>) -> Self {
        Self {
            name: name.into(),
            runnable: true,
            methods,
        }
    }

    /// Creates a class that is indexed but not executable.
    pub fn not_runnable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runnable: false,
            methods: Vec::new(),
        }
    }

    /// The package portion of the class name (everything before the last dot).
    pub fn package_name(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(pkg, _)| pkg)
    }

    /// The class name without its package.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit_once('.').map_or(&*self.name, |(_, s)| s)
    }
}

/// The pre-generated registry of all compiled test classes.
#[derive(Clone, Debug, Default)]
pub struct TestIndex {
    classes: Vec<TestClass>,
}

impl TestIndex {
    /// Creates an index over the given classes.
    pub fn new(classes: Vec<TestClass>) -> Self {
        Self { classes }
    }

    /// Iterates over every indexed class.
    pub fn classes(&self) -> impl Iterator<Item = &TestClass> + '_ {
        self.classes.iter()
    }
}

/// Canonical test identifier: `methodName(fully.qualified.ClassName)`.
pub fn canonical_id(method_name: &str, class_name: &str) -> String {
    format!("{method_name}({class_name})")
}

/// A single test with its owning class, borrowed from the index.
#[derive(Clone, Copy, Debug)]
pub struct TestInstance<'i> {
    /// The owning class.
    pub class: &'i TestClass,
    /// The method to run.
    pub method: &'i TestMethod,
}

impl TestInstance<'_> {
    /// The canonical `method(Class)` identifier.
    pub fn id(&self) -> String {
        canonical_id(&self.method.name, &self.class.name)
    }

    /// The short `Class.method` display form.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.class.simple_name(), self.method.name)
    }
}

/// One sequenced class with its ordered methods.
#[derive(Clone, Debug)]
pub struct RequestedClass<'i> {
    /// The class, borrowed from the index.
    pub class: &'i TestClass,
    /// Methods in execution order.
    pub methods: Vec<&'i TestMethod>,
}

/// An ordered, shard-filtered, prioritised set of tests ready to execute.
#[derive(Clone, Debug, Default)]
pub struct TestRequest<'i> {
    classes: Vec<RequestedClass<'i>>,
}

impl<'i> TestRequest<'i> {
    pub(crate) fn new(classes: Vec<RequestedClass<'i>>) -> Self {
        Self { classes }
    }

    /// The sequenced classes, in execution order.
    pub fn classes(&self) -> &[RequestedClass<'i>] {
        &self.classes
    }

    /// The total number of test methods in the request.
    pub fn test_count(&self) -> usize {
        self.classes.iter().map(|c| c.methods.len()).sum()
    }

    /// Returns true if no tests are sequenced.
    pub fn is_empty(&self) -> bool {
        self.test_count() == 0
    }

    /// Iterates over every sequenced test in execution order.
    pub fn instances(&self) -> impl Iterator<Item = TestInstance<'i>> + '_ {
        self.classes.iter().flat_map(|rc| {
            rc.methods.iter().map(|&method| TestInstance {
                class: rc.class,
                method,
            })
        })
    }

    /// Canonical ids of every sequenced test, in execution order.
    pub fn test_ids(&self) -> Vec<String> {
        self.instances().map(|instance| instance.id()).collect()
    }

    /// Retains only tests whose canonical id satisfies `keep`, dropping
    /// classes that end up empty. Used to apply an optimized subset.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        for rc in &mut self.classes {
            let class_name = &rc.class.name;
            rc.methods
                .retain(|method| keep(&canonical_id(&method.name, class_name)));
        }
        self.classes.retain(|rc| !rc.methods.is_empty());
    }

    /// Outputs the request in the given format.
    pub fn write(
        &self,
        format: OutputFormat,
        colorize: bool,
        mut writer: impl Write,
    ) -> io::Result<()> {
        match format {
            OutputFormat::Plain => self.write_plain(colorize, &mut writer),
            OutputFormat::Json => serde_json::to_writer(&mut writer, &self.summary())
                .map_err(io::Error::other)
                .and_then(|()| writeln!(writer)),
            OutputFormat::JsonPretty => serde_json::to_writer_pretty(&mut writer, &self.summary())
                .map_err(io::Error::other)
                .and_then(|()| writeln!(writer)),
        }
    }

    fn write_plain(&self, colorize: bool, mut writer: impl Write) -> io::Result<()> {
        for rc in &self.classes {
            let header = markup::paint(&format!("@|bold {}|@:", rc.class.name), colorize);
            writeln!(writer, "{header}")?;
            for method in &rc.methods {
                writeln!(writer, "    {}", method.name)?;
            }
        }
        Ok(())
    }

    fn summary(&self) -> TestListSummary {
        TestListSummary {
            test_count: self.test_count(),
            classes: self
                .classes
                .iter()
                .map(|rc| {
                    (
                        rc.class.name.clone(),
                        rc.methods.iter().map(|m| m.name.clone()).collect(),
                    )
                })
                .collect(),
        }
    }
}

/// Serializable form of a sequenced request, for machine consumers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct TestListSummary {
    test_count: usize,
    classes: BTreeMap<String, Vec<String>>,
}

/// Output format for `--list`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OutputFormat {
    /// Human-readable listing.
    #[default]
    Plain,
    /// Compact JSON.
    Json,
    /// Indented JSON.
    JsonPretty,
}

impl OutputFormat {
    /// All accepted `--list` format names.
    pub fn variants() -> [&'static str; 3] {
        ["plain", "json", "json-pretty"]
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Plain => write!(f, "plain"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonPretty => write!(f, "json-pretty"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" => Ok(OutputFormat::JsonPretty),
            other => Err(format!(
                "unrecognized format '{}' (known formats: {})",
                other,
                OutputFormat::variants().join(", ")
            )),
        }
    }
}
