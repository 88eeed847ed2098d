//! pytest-conical-uploader: publish pytest results to a Conical server.
//!
//! This crate reads the console log of a pytest run, maps it to a list of
//! test results, and uploads those results as a single test run set, with
//! the full log and any per-test artefact files attached.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Config**: Resolve and validate the command line ([`config`])
//! - **Framework**: Turn a framework log into results ([`framework`])
//! - **Artefacts**: Match artefact files to tests by name ([`artefacts`])
//! - **Publisher**: Sequence the remote calls for one upload ([`publisher`])
//! - **Tracking**: The remote service capability and its HTTP client ([`tracking`])
//!
//! # Example
//!
//! ```no_run
//! use std::io::BufReader;
//!
//! use pytest_conical_uploader::config::{resolve, Invocation};
//! use pytest_conical_uploader::framework::{LogProcessor, pytest::PytestLogProcessor};
//! use pytest_conical_uploader::publisher::Publisher;
//! use pytest_conical_uploader::tracking::conical::ConicalClient;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let Invocation::Upload(config) = resolve(std::env::args().skip(1))? else {
//!         return Ok(());
//!     };
//!
//!     let processor = PytestLogProcessor::new();
//!     let mut log = BufReader::new(std::fs::File::open(&config.log_file)?);
//!     let results = processor.process(&mut log)?;
//!
//!     let client = ConicalClient::new(&config.server, config.token.clone())?;
//!     let publisher = Publisher::new(client, processor.label());
//!     let summary = publisher.publish(&config, &results).await?;
//!     println!("Uploaded {} test(s) to run set #{}", summary.runs, summary.run_set_id);
//!     Ok(())
//! }
//! ```

pub mod artefacts;
pub mod config;
pub mod framework;
pub mod publisher;
pub mod tracking;

// Re-export commonly used types
pub use config::{Invocation, UploadConfig, resolve};
pub use framework::{LogProcessor, TestResult};
pub use publisher::{PublishError, PublishSummary, Publisher};
pub use tracking::{TrackingError, TrackingSink};
