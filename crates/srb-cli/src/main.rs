mod bootstrap_helpers;
mod cli_args;
mod config_file;
mod startup;

use anyhow::{bail, Result};
use clap::Parser;
use srb_slack_runtime::{run_slack_bridge, ShutdownReason};

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::startup::resolve_runtime_config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = resolve_runtime_config(&cli)?;
    let report = run_slack_bridge(config).await?;
    if report.reason == ShutdownReason::InvalidAuth {
        bail!("slack rejected the configured credentials");
    }
    Ok(())
}

#[cfg(test)]
mod tests;
