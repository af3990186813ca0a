//! CLI definitions for ChatPilot.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ChatPilot CLI.
#[derive(Parser)]
#[command(name = "chatpilot")]
#[command(about = "Serialized automation substrate for desktop chat clients")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (defaults to ~/.chatpilot/config.toml)
    #[arg(short, long, global = true, env = "CHATPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Validate the configuration
    Config {
        /// Print the effective configuration as JSON
        #[arg(long)]
        show: bool,
    },

    /// Drive a session over the in-memory driver and report timings
    Soak {
        /// Number of conversations to listen to
        #[arg(long, default_value_t = 8)]
        conversations: usize,

        /// Reply rounds per conversation
        #[arg(long, default_value_t = 4)]
        rounds: usize,

        /// Simulated latency of every driver call, in milliseconds
        #[arg(long, default_value_t = 2)]
        latency_ms: u64,

        /// Override the pause between listener releases, in milliseconds
        #[arg(long)]
        release_pause_ms: Option<u64>,
    },
}
