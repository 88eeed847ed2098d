//! The remote test-results tracking service.
//!
//! The publisher talks to the service only through [`TrackingSink`], which
//! exposes the handful of create/publish/status operations an upload needs.
//! [`conical::ConicalClient`] implements it over HTTP; tests substitute an
//! in-memory recorder.
//!
//! # Remote Graph
//!
//! ```text
//! Product
//! └── RunSet ─────────── additional file ("Full log")
//!     ├── TestRun ────── additional files ("Artefact"), log messages
//!     └── TestRun ────── ...
//! ```

pub mod conical;

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Serialize;

/// Result type for tracking service operations.
pub type TrackingResult<T> = Result<T, TrackingError>;

/// Errors reported by a tracking sink.
#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    /// The named product does not exist on the server.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// The server address could not be used to build request URLs.
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The server's response body was not understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A product on the tracking service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub name: String,
}

/// Request to create a test run set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRunSet {
    pub name: String,
    pub description: Option<String>,
    pub ref_date: Option<NaiveDateTime>,
    pub tags: Vec<String>,
}

/// A created test run set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSetHandle {
    pub id: u64,
    pub product: String,
}

/// Binary outcome recorded for a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestRunStatus {
    Passed,
    Failed,
}

impl From<bool> for TestRunStatus {
    fn from(passed: bool) -> Self {
        if passed {
            TestRunStatus::Passed
        } else {
            TestRunStatus::Failed
        }
    }
}

/// Request to create a test run inside a run set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTestRun {
    pub name: String,
    /// Framework label, stored by the service as the run's description.
    #[serde(rename = "description")]
    pub framework: String,
    pub test_run_type: String,
    pub status: TestRunStatus,
}

/// A created test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunHandle {
    pub id: u64,
    pub run_set_id: u64,
    pub product: String,
}

/// Terminal state of a run set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunSetStatus {
    /// Upload finished; the run set is complete.
    Standard,
}

/// A file to attach, opened for the duration of one publish call.
///
/// The sink takes ownership and the file handle is closed when the call
/// returns, whether or not it succeeded.
#[derive(Debug)]
pub struct FileUpload {
    /// Display name on the service.
    pub name: String,
    /// Label, e.g. `"Full log"` or `"Artefact"`.
    pub description: String,
    pub file: tokio::fs::File,
}

impl FileUpload {
    /// Opens `path` for upload.
    pub async fn open(
        path: &Path,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> std::io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self {
            name: name.into(),
            description: description.into(),
            file,
        })
    }
}

/// Capability for writing results to a tracking service.
///
/// Calls are made strictly one at a time; implementations need not
/// support concurrent use of the same run set.
#[async_trait]
pub trait TrackingSink: Send + Sync {
    /// Looks up a product by name.
    async fn product(&self, name: &str) -> TrackingResult<Product>;

    /// Creates a test run set under `product`.
    async fn create_run_set(
        &self,
        product: &Product,
        run_set: &NewRunSet,
    ) -> TrackingResult<RunSetHandle>;

    /// Attaches a file to a run set.
    async fn publish_run_set_file(
        &self,
        run_set: &RunSetHandle,
        upload: FileUpload,
    ) -> TrackingResult<()>;

    /// Creates a test run inside a run set.
    async fn create_test_run(
        &self,
        run_set: &RunSetHandle,
        run: &NewTestRun,
    ) -> TrackingResult<TestRunHandle>;

    /// Attaches a file to a test run.
    async fn publish_test_run_file(
        &self,
        run: &TestRunHandle,
        upload: FileUpload,
    ) -> TrackingResult<()>;

    /// Publishes a test run's log messages, in order.
    async fn publish_test_run_logs(
        &self,
        run: &TestRunHandle,
        lines: &[String],
    ) -> TrackingResult<()>;

    /// Sets a run set's status.
    async fn set_run_set_status(
        &self,
        run_set: &RunSetHandle,
        status: RunSetStatus,
    ) -> TrackingResult<()>;

    /// Sink name (for logging).
    fn name(&self) -> &str;
}
