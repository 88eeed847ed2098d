//! pytest-conical-uploader CLI - publish pytest results to Conical.

use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pytest_conical_uploader::config::{self, ConfigError, Invocation, UploadConfig};
use pytest_conical_uploader::framework::{LogProcessor, pytest::PytestLogProcessor};
use pytest_conical_uploader::publisher::{PublishError, PublishSummary, Publisher};
use pytest_conical_uploader::tracking::conical::ConicalClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(std::env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("{err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(args: Vec<String>) -> Result<()> {
    let config = match config::resolve(args)? {
        Invocation::ShowHelp => {
            println!("{}", config::HELP_TEXT);
            return Ok(());
        }
        Invocation::Upload(config) => config,
    };

    upload(&config).await
}

async fn upload(config: &UploadConfig) -> Result<()> {
    let client = ConicalClient::new(&config.server, config.token.clone())
        .context("Unable to create Conical client")?;

    let processor = PytestLogProcessor::new();
    info!("Processing log file: {}", config.log_file.display());
    let results = {
        let file = File::open(&config.log_file).with_context(|| {
            format!("Unable to open log file {}", config.log_file.display())
        })?;
        processor
            .process(&mut BufReader::new(file))
            .with_context(|| format!("Unable to process {} log", processor.name()))?
    };

    let publisher = Publisher::new(client, processor.label());
    let summary = publisher.publish(config, &results).await?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &PublishSummary) {
    println!();
    println!("Test run set #{} uploaded:", summary.run_set_id);
    println!("  Runs:      {}", summary.runs);
    println!("  Passed:    {}", console::style(summary.passed).green());
    println!("  Failed:    {}", console::style(summary.failed).red());
    println!("  Artefacts: {}", summary.artefacts);
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let code = if let Some(e) = err.downcast_ref::<ConfigError>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<PublishError>() {
        e.exit_code()
    } else {
        1
    };
    u8::try_from(code).unwrap_or(1)
}
