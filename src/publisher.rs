//! Publishing parsed results to the tracking service.
//!
//! The [`Publisher`] turns a flat list of [`TestResult`]s and a directory of
//! artefact files into a remote run set graph. It is a single sequential
//! pass:
//!
//! 1. look up the product
//! 2. create the run set
//! 3. attach the full log to the run set
//! 4. list the artefacts directory (once)
//! 5. for each result, in order: create the run, attach its artefacts,
//!    publish its composed log messages
//! 6. mark the run set complete
//!
//! The first failing remote call aborts the upload. Nothing is retried and
//! nothing already written is rolled back.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::artefacts::ArtefactIndex;
use crate::config::UploadConfig;
use crate::framework::TestResult;
use crate::tracking::{
    FileUpload, NewRunSet, NewTestRun, RunSetHandle, RunSetStatus, TestRunStatus, TrackingError,
    TrackingSink,
};

/// File name of the full log attached to the run set.
pub const FULL_LOG_NAME: &str = "Test spec output.txt";

/// Label of the full log attached to the run set.
pub const FULL_LOG_DESCRIPTION: &str = "Full log";

/// Label of every per-test artefact.
pub const ARTEFACT_DESCRIPTION: &str = "Artefact";

const BODY_HEADER: &str = "=== BODY ===";
const STD_OUT_HEADER: &str = "=== STD OUT ===";
const LOGS_HEADER: &str = "=== LOGS ===";

/// Errors that abort an upload.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The product could not be resolved.
    #[error("Unable to source product from the Conical server")]
    RemoteLookup(#[source] TrackingError),

    /// A create, publish or status call failed.
    #[error("Failed to {step}")]
    RemoteWrite {
        step: String,
        #[source]
        source: TrackingError,
    },

    /// A local file could not be read.
    #[error("Unable to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }

    fn write(step: impl Into<String>) -> impl FnOnce(TrackingError) -> Self {
        let step = step.into();
        move |source| PublishError::RemoteWrite { step, source }
    }

    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| PublishError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What an upload created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub run_set_id: u64,
    pub runs: usize,
    pub passed: usize,
    pub failed: usize,
    pub artefacts: usize,
}

/// Remote run name for a dotted test name: `pkg.mod.test_x` → `pkg\mod\test_x`.
pub fn run_display_name(test_name: &str) -> String {
    test_name.split('.').collect::<Vec<_>>().join("\\")
}

/// Builds the log messages published for a test run.
///
/// Sections appear in the order body, std out, logs. A section whose lines
/// are empty is left out entirely, header and trailing blank line included.
pub fn compose_log_messages(result: &TestResult) -> Vec<String> {
    let sections = [
        (BODY_HEADER, &result.body),
        (STD_OUT_HEADER, &result.std_out),
        (LOGS_HEADER, &result.log_messages),
    ];

    let mut lines = Vec::new();
    for (header, section) in sections {
        if section.is_empty() {
            continue;
        }
        lines.push(header.to_string());
        lines.extend(section.iter().cloned());
        lines.push(String::new());
    }
    lines
}

/// Uploads results to a [`TrackingSink`].
pub struct Publisher<S> {
    sink: S,
    framework_label: String,
}

impl<S: TrackingSink> Publisher<S> {
    /// Creates a publisher that labels every run with `framework_label`.
    pub fn new(sink: S, framework_label: impl Into<String>) -> Self {
        Self {
            sink,
            framework_label: framework_label.into(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Publishes `results` as a new run set described by `config`.
    pub async fn publish(
        &self,
        config: &UploadConfig,
        results: &[TestResult],
    ) -> Result<PublishSummary, PublishError> {
        info!("Using tracking sink: {}", self.sink.name());

        let product = self
            .sink
            .product(&config.product)
            .await
            .map_err(PublishError::RemoteLookup)?;

        info!("Creating test run set '{}'", config.run_set.name);
        let request = NewRunSet {
            name: config.run_set.name.clone(),
            description: config.run_set.description.clone(),
            ref_date: config.run_set.ref_date,
            tags: config.run_set.tags.clone(),
        };
        let run_set = self
            .sink
            .create_run_set(&product, &request)
            .await
            .map_err(PublishError::write("create test run set"))?;
        info!(" => #{}", run_set.id);

        info!(" => Uploading full log as additional file");
        let upload = FileUpload::open(&config.log_file, FULL_LOG_NAME, FULL_LOG_DESCRIPTION)
            .await
            .map_err(PublishError::io(&config.log_file))?;
        self.sink
            .publish_run_set_file(&run_set, upload)
            .await
            .map_err(PublishError::write("upload full log"))?;

        let artefacts = match &config.artefacts_directory {
            Some(dir) => ArtefactIndex::scan(dir)
                .await
                .map_err(PublishError::io(dir))?,
            None => ArtefactIndex::empty(),
        };
        if !artefacts.is_empty() {
            info!(" => {} artefact file(s) available", artefacts.len());
        }

        let mut summary = PublishSummary {
            run_set_id: run_set.id,
            ..Default::default()
        };

        info!(" => Uploading {} test(s)", results.len());
        for result in results {
            summary.artefacts += self
                .publish_result(&run_set, &config.test_run_type, result, &artefacts)
                .await?;
            summary.runs += 1;
            if result.passed {
                summary.passed += 1;
            } else {
                summary.failed += 1;
            }
        }

        self.sink
            .set_run_set_status(&run_set, RunSetStatus::Standard)
            .await
            .map_err(PublishError::write("set test run set status"))?;

        Ok(summary)
    }

    /// Creates one test run and fills it. Returns the number of artefacts.
    async fn publish_result(
        &self,
        run_set: &RunSetHandle,
        test_run_type: &str,
        result: &TestResult,
        artefacts: &ArtefactIndex,
    ) -> Result<usize, PublishError> {
        info!("  => {}", result.name);

        let request = NewTestRun {
            name: run_display_name(&result.name),
            framework: self.framework_label.clone(),
            test_run_type: test_run_type.to_string(),
            status: TestRunStatus::from(result.passed),
        };
        let run = self
            .sink
            .create_test_run(run_set, &request)
            .await
            .map_err(PublishError::write(format!(
                "create test run '{}'",
                result.name
            )))?;

        let matches = artefacts.matching(&result.name);
        for artefact in &matches {
            info!("   => Uploading artefact '{}'", artefact.display_name);
            let upload =
                FileUpload::open(&artefact.path, &artefact.display_name, ARTEFACT_DESCRIPTION)
                    .await
                    .map_err(PublishError::io(&artefact.path))?;
            self.sink
                .publish_test_run_file(&run, upload)
                .await
                .map_err(PublishError::write(format!(
                    "upload artefact '{}'",
                    artefact.path.display()
                )))?;
        }

        let lines = compose_log_messages(result);
        debug!("Publishing {} log line(s) for {}", lines.len(), result.name);
        self.sink
            .publish_test_run_logs(&run, &lines)
            .await
            .map_err(PublishError::write(format!(
                "publish logs for '{}'",
                result.name
            )))?;

        Ok(matches.len())
    }
}
