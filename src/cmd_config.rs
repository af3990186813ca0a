//! Config subcommand handler.

use std::path::Path;

use tracing::warn;

use chatpilot_config::{Config, ConfigValidator};

/// Validate the loaded configuration and optionally print it.
pub(crate) fn handle_config_command(
    path: &Path,
    config: &Config,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config);

    for warning in &result.warnings {
        warn!("{}: {}", warning.path, warning.message);
        eprintln!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        eprintln!("error: {}", error);
    }
    if !result.is_valid() {
        return Err(format!(
            "{} has {} invalid setting(s)",
            path.display(),
            result.errors.len()
        )
        .into());
    }

    if show {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else if path.exists() {
        println!("Configuration OK: {}", path.display());
    } else {
        println!("No file at {}; using defaults", path.display());
    }
    Ok(())
}
