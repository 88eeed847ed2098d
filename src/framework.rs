//! Test results and the log processing capability.
//!
//! A test framework's captured output is turned into a flat list of
//! [`TestResult`] records by a [`LogProcessor`]. The publisher consumes those
//! records without knowing which framework produced them.
//!
//! ```text
//! ┌──────────────┐   process(reader)   ┌──────────────────┐
//! │  log file    │ ──────────────────► │ Vec<TestResult>  │
//! └──────────────┘                     └──────────────────┘
//! ```
//!
//! # Built-in Processors
//!
//! | Processor | Framework | Expected Output |
//! |-----------|-----------|-----------------|
//! | [`pytest::PytestLogProcessor`] | pytest | `pytest -rA` console output |
//!
//! # Custom Processors
//!
//! ```no_run
//! use std::io::BufRead;
//! use pytest_conical_uploader::framework::*;
//!
//! struct TapProcessor;
//!
//! impl LogProcessor for TapProcessor {
//!     fn process(&self, log: &mut dyn BufRead) -> FrameworkResult<Vec<TestResult>> {
//!         // Parse TAP lines into results
//!         todo!()
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "tap"
//!     }
//!
//!     fn label(&self) -> &'static str {
//!         "TAP"
//!     }
//! }
//! ```

pub mod pytest;

use std::io::BufRead;

/// Result type for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;

/// Errors that can occur while processing a test log.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    /// I/O error reading the log stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The recorded outcome of a single test, as read from a framework log.
///
/// Records are immutable once produced. The name is a dot-delimited
/// hierarchical identifier such as `tests.test_math.TestCalc.test_add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    /// Dot-delimited test name.
    pub name: String,

    /// Whether the test passed.
    pub passed: bool,

    /// Failure or report body (tracebacks, assertion output).
    pub body: Vec<String>,

    /// Captured standard output lines.
    pub std_out: Vec<String>,

    /// Captured log-record lines.
    pub log_messages: Vec<String>,
}

impl TestResult {
    /// Creates a result with no captured lines.
    pub fn new(name: impl Into<String>, passed: bool) -> Self {
        Self {
            name: name.into(),
            passed,
            body: Vec::new(),
            std_out: Vec::new(),
            log_messages: Vec::new(),
        }
    }

    /// Sets the body lines.
    pub fn with_body<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.body = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the standard output lines.
    pub fn with_std_out<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.std_out = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the log-message lines.
    pub fn with_log_messages<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.log_messages = lines.into_iter().map(Into::into).collect();
        self
    }
}

/// Capability that turns a framework's captured output into test results.
///
/// Implementations own all knowledge of the log format. An empty result list
/// is a valid outcome and is not an error.
pub trait LogProcessor: Send + Sync {
    /// Reads the whole log and returns the results in report order.
    fn process(&self, log: &mut dyn BufRead) -> FrameworkResult<Vec<TestResult>>;

    /// Framework name (for logging).
    fn name(&self) -> &'static str;

    /// Label recorded against every remote test run.
    fn label(&self) -> &'static str;
}
