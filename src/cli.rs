//! CLI definitions for Sidekick.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sidekick CLI.
#[derive(Parser)]
#[command(name = "sidekick")]
#[command(about = "On-device AI assistant coordinator")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long, global = true, env = "SIDEKICK_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Serve a JSON-lines caller channel on stdin/stdout (default)
    Serve {
        /// Delay between streamed words of the echo model, in milliseconds
        #[arg(long, default_value_t = 0)]
        word_delay_ms: u64,
    },

    /// Validate the configuration and print the effective values
    CheckConfig,
}
