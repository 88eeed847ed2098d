//! Command line flag handling.
//!
//! Flags use a single leading dash and are matched case-insensitively
//! (`-logFile`, `-LOGFILE`). Every flag except `--help` takes the next
//! argument verbatim as its value, even when that value starts with a dash.
//!
//! The raw argument list is first rewritten into `--flag=value` tokens and
//! then handed to clap, which owns the typed view in [`RawArgs`].

use std::collections::HashMap;
use std::ffi::OsString;

use clap::Parser;

use super::{ConfigError, ConfigResult};

/// Text shown for `--help` and for an empty argument list.
pub const HELP_TEXT: &str = "\
Pytest results uploader
=======================

Summary:
Publishes the results of a local pytest run to a Conical server as a single
test run set, together with the full log and any per-test artefacts.

The log must come from a run made with the -rA flag specified.

Required:
 -logFile XXX                   The file containing the pytest output

Optional:
 -artefactsDirectory XXX        Directory holding test artefacts for upload

Conical parameters:
 -server XXX                    The Conical server
 -product XXX                   The name of the product on the Conical instance
 -token XXX                     The token to use when accessing Conical
 -testRunType XXX               The test run type to upload test runs as
 -testRunSetName XXX            The name to use for the test run set
 -testRunSetDescription XXX     The description to use for the test run set
 -testRunSetTag XXX             Optional tag value (repeatable)
 -testRunSetRefDate XXX         Optional ref date for the test run set
 -testRunSetRefDateFormat XXX   Optional format for parsing testRunSetRefDate

Others:
 --help                         Show this help text

Set RUST_LOG to change the log level (default: info).";

/// A recognised flag: the spelling users type and the clap long name.
struct Flag {
    name: &'static str,
    long: &'static str,
    repeatable: bool,
}

const FLAGS: &[Flag] = &[
    Flag { name: "-logfile", long: "log-file", repeatable: false },
    Flag { name: "-artefactsdirectory", long: "artefacts-directory", repeatable: false },
    Flag { name: "-server", long: "server", repeatable: false },
    Flag { name: "-product", long: "product", repeatable: false },
    Flag { name: "-token", long: "token", repeatable: false },
    Flag { name: "-testruntype", long: "test-run-type", repeatable: false },
    Flag { name: "-testrunsetname", long: "test-run-set-name", repeatable: false },
    Flag { name: "-testrunsetdescription", long: "test-run-set-description", repeatable: false },
    Flag { name: "-testrunsettag", long: "test-run-set-tag", repeatable: true },
    Flag { name: "-testrunsetrefdate", long: "test-run-set-ref-date", repeatable: false },
    Flag { name: "-testrunsetrefdateformat", long: "test-run-set-ref-date-format", repeatable: false },
];

const HELP_FLAG: &str = "--help";

/// Typed view of the command line, before validation.
///
/// Every field is optional here; [`super::resolve`] decides what is
/// required.
#[derive(Debug, Default, Parser)]
#[command(name = "pytest-conical-uploader")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct RawArgs {
    #[arg(long)]
    pub log_file: Option<String>,

    #[arg(long)]
    pub artefacts_directory: Option<String>,

    #[arg(long)]
    pub server: Option<String>,

    #[arg(long)]
    pub product: Option<String>,

    #[arg(long)]
    pub token: Option<String>,

    #[arg(long)]
    pub test_run_type: Option<String>,

    #[arg(long)]
    pub test_run_set_name: Option<String>,

    #[arg(long)]
    pub test_run_set_description: Option<String>,

    #[arg(long = "test-run-set-tag")]
    pub test_run_set_tags: Vec<String>,

    #[arg(long)]
    pub test_run_set_ref_date: Option<String>,

    #[arg(long)]
    pub test_run_set_ref_date_format: Option<String>,
}

/// What the command line asks for.
#[derive(Debug)]
pub enum Parsed {
    /// `--help` was given, or no arguments at all.
    Help,
    /// Flags to validate.
    Args(RawArgs),
}

/// Parses the argument list (without the program name).
pub fn parse_args<I, S>(args: I) -> ConfigResult<Parsed>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    if args.is_empty() {
        return Ok(Parsed::Help);
    }

    let Some(tokens) = canonicalize(&args)? else {
        return Ok(Parsed::Help);
    };

    let argv = std::iter::once(OsString::from("pytest-conical-uploader"))
        .chain(tokens.into_iter().map(OsString::from));

    RawArgs::try_parse_from(argv)
        .map(Parsed::Args)
        .map_err(|e| ConfigError::InvalidArguments(e.to_string()))
}

/// Rewrites user flags into `--long=value` tokens.
///
/// Returns `None` when `--help` is reached. Single-valued flags keep their
/// last occurrence; repeatable flags keep every occurrence in order.
fn canonicalize(args: &[String]) -> ConfigResult<Option<Vec<String>>> {
    let mut pairs: Vec<(&'static Flag, &str)> = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let lowered = arg.to_lowercase();
        if lowered == HELP_FLAG {
            return Ok(None);
        }

        let flag = FLAGS
            .iter()
            .find(|f| f.name == lowered)
            .ok_or_else(|| ConfigError::UnknownArgument(arg.clone()))?;

        let value = iter
            .next()
            .ok_or_else(|| ConfigError::MissingArgumentValue(arg.clone()))?;

        pairs.push((flag, value.as_str()));
    }

    let mut last_index: HashMap<&'static str, usize> = HashMap::new();
    for (i, (flag, _)) in pairs.iter().enumerate() {
        last_index.insert(flag.long, i);
    }

    let tokens = pairs
        .iter()
        .enumerate()
        .filter(|(i, (flag, _))| flag.repeatable || last_index.get(flag.long) == Some(i))
        .map(|(_, (flag, value))| format!("--{}={}", flag.long, value))
        .collect();

    Ok(Some(tokens))
}
