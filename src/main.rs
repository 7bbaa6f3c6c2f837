//! Sidekick - on-device AI assistant coordinator.
//!
//! Main entry point for the Sidekick CLI harness.

mod adapters;
mod cli;
mod server;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use sidekick_config::{ConfigLoader, ConfigValidator};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Serve { word_delay_ms: 0 }) {
        Commands::Serve { word_delay_ms } => {
            let _guard = server::init_tracing(&config.logging)?;
            server::run_stdio(config, Duration::from_millis(word_delay_ms)).await
        }
        Commands::CheckConfig => check_config(&config),
    }
}

fn check_config(config: &sidekick_config::Config) -> anyhow::Result<()> {
    let result = ConfigValidator::validate(config)?;
    for warning in &result.warnings {
        eprintln!("warning: {}: {}", warning.path, warning.message);
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
