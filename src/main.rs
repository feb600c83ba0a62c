use std::fs::{self, OpenOptions};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use faststart::{CliArgs, MigrationConfig, run_migration};

const LOG_FILENAME: &str = "migrate.log";

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<()> {
    let config = args.into_config();
    fs::create_dir_all(&config.data_path)
        .with_context(|| format!("failed to create {}", config.data_path.display()))?;
    init_logging(&config)?;
    run_migration(&config)
}

/// Log to stderr and, in parallel, to `migrate.log` in the data directory.
fn init_logging(config: &MigrationConfig) -> Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.data_path.join(LOG_FILENAME))
        .context("failed to open migrate.log")?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,faststart=debug".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();
    Ok(())
}
