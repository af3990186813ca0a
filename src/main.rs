//! ChatPilot - serialized automation substrate for desktop chat clients.
//!
//! Main entry point for the ChatPilot operator CLI.

mod cli;
mod cmd_config;
mod cmd_soak;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use chatpilot_config::{ConfigLoader, LoggingConfig};

use crate::cli::{Cli, Commands};

/// Console plus daily rolling file logging.
fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = PathBuf::from(ConfigLoader::expand_path(&logging.directory));
    std::fs::create_dir_all(&log_dir)?;

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(logging.file_prefix.clone())
        .filename_suffix("log");
    if logging.max_files > 0 {
        builder = builder.max_log_files(logging.max_files);
    }
    let file_appender = builder.build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keeps the background writer alive for the process lifetime, including
    // the exit-hook sweep.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(logging.ansi)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(ConfigLoader::default_path);
    let config = ConfigLoader::load_or_default(&config_path)?;

    init_tracing(&config.logging)?;
    info!("ChatPilot v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Config { show } => {
            cmd_config::handle_config_command(&config_path, &config, show)
        }
        Commands::Soak {
            conversations,
            rounds,
            latency_ms,
            release_pause_ms,
        } => {
            cmd_soak::run_soak(&config, conversations, rounds, latency_ms, release_pause_ms).await
        }
    }
}
