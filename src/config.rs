//! Command line configuration for an upload.
//!
//! [`resolve`] turns the raw argument list into a single immutable
//! [`UploadConfig`], validating everything that can be checked locally
//! before any network access happens.
//!
//! # Validation Order
//!
//! The first failing check wins:
//!
//! 1. every flag is recognised and has a value
//! 2. a log file is given
//! 3. the log file exists
//! 4. server, product, test run type, test run set name are given
//! 5. the reference date (if any) parses
//!
//! # Example
//!
//! ```no_run
//! use pytest_conical_uploader::config::{resolve, Invocation};
//!
//! let invocation = resolve([
//!     "-logFile", "pytest.log",
//!     "-server", "https://conical.example.com",
//!     "-product", "calculator",
//!     "-testRunType", "Pytest",
//!     "-testRunSetName", "nightly",
//! ])?;
//!
//! if let Invocation::Upload(config) = invocation {
//!     println!("Uploading {}", config.log_file.display());
//! }
//! # Ok::<(), pytest_conical_uploader::config::ConfigError>(())
//! ```

pub mod args;
pub mod date;

use std::path::PathBuf;

use chrono::NaiveDateTime;

pub use args::{HELP_TEXT, RawArgs};
pub use date::parse_reference_date;

use args::Parsed;

/// Result type for configuration resolution.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A mandatory setting, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    LogFile,
    Server,
    Product,
    TestRunType,
    TestRunSetName,
}

impl RequiredField {
    /// Diagnostic shown when the field is missing.
    pub fn message(&self) -> &'static str {
        match self {
            RequiredField::LogFile => "No log file specified",
            RequiredField::Server => "No Conical server specified",
            RequiredField::Product => "No Conical product specified",
            RequiredField::TestRunType => "No Conical test run type specified",
            RequiredField::TestRunSetName => "A valid test run set name must be specified",
        }
    }
}

/// Errors that stop an upload before it starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A token that is not a recognised flag.
    #[error("Unknown command line arg - {0}")]
    UnknownArgument(String),

    /// A flag was the last argument, so it has no value.
    #[error("No value given for command line arg - {0}")]
    MissingArgumentValue(String),

    /// A mandatory setting was absent or empty.
    #[error("{}", .0.message())]
    MissingRequiredField(RequiredField),

    /// The log file path does not exist.
    #[error("Specified log file doesn't exist - {}", .0.display())]
    FileNotFound(PathBuf),

    /// The reference date could not be parsed.
    #[error("{}", describe_date_failure(.value, .format.as_deref()))]
    DateParse {
        value: String,
        format: Option<String>,
    },

    /// clap rejected the canonical argument list.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ConfigError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

fn describe_date_failure(value: &str, format: Option<&str>) -> String {
    match format {
        Some(format) => {
            format!("Unable to parse '{value}' as a valid date using format '{format}'")
        }
        None => format!("Unable to parse '{value}' as a valid date"),
    }
}

/// The test run set to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSetConfig {
    pub name: String,
    pub description: Option<String>,
    pub ref_date: Option<NaiveDateTime>,
    /// In the order given; duplicates are kept.
    pub tags: Vec<String>,
}

/// Validated settings for one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// pytest output to parse and attach.
    pub log_file: PathBuf,

    /// Directory scanned (non-recursively) for per-test artefacts.
    pub artefacts_directory: Option<PathBuf>,

    /// Base URL of the Conical server.
    pub server: String,

    pub product: String,

    /// Anonymous access is allowed, so this may be absent.
    pub token: Option<String>,

    /// Test run type every created run is recorded as.
    pub test_run_type: String,

    pub run_set: RunSetConfig,
}

/// What the command line asks the tool to do.
#[derive(Debug)]
pub enum Invocation {
    ShowHelp,
    Upload(UploadConfig),
}

/// Resolves the argument list (without the program name).
pub fn resolve<I, S>(args: I) -> ConfigResult<Invocation>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    match args::parse_args(args)? {
        Parsed::Help => Ok(Invocation::ShowHelp),
        Parsed::Args(raw) => validate(raw).map(Invocation::Upload),
    }
}

/// Validates the typed arguments into an [`UploadConfig`].
pub fn validate(raw: RawArgs) -> ConfigResult<UploadConfig> {
    let log_file = non_empty(raw.log_file)
        .map(PathBuf::from)
        .ok_or(ConfigError::MissingRequiredField(RequiredField::LogFile))?;

    if !log_file.is_file() {
        return Err(ConfigError::FileNotFound(log_file));
    }

    let server = required(raw.server, RequiredField::Server)?;
    let product = required(raw.product, RequiredField::Product)?;
    let test_run_type = required(raw.test_run_type, RequiredField::TestRunType)?;
    let name = required(raw.test_run_set_name, RequiredField::TestRunSetName)?;

    let ref_date = non_empty(raw.test_run_set_ref_date)
        .map(|value| parse_reference_date(&value, raw.test_run_set_ref_date_format.as_deref()))
        .transpose()?;

    Ok(UploadConfig {
        log_file,
        artefacts_directory: non_empty(raw.artefacts_directory).map(PathBuf::from),
        server,
        product,
        token: non_empty(raw.token),
        test_run_type,
        run_set: RunSetConfig {
            name,
            description: non_empty(raw.test_run_set_description),
            ref_date,
            tags: raw.test_run_set_tags,
        },
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn required(value: Option<String>, field: RequiredField) -> ConfigResult<String> {
    non_empty(value).ok_or(ConfigError::MissingRequiredField(field))
}
