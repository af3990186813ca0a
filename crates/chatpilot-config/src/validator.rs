//! Configuration validation.

use crate::schema::Config;

const KNOWN_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_session(config, &mut result);
        Self::validate_lifecycle(config, &mut result);
        Self::validate_retry(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_session(config: &Config, result: &mut ValidationResult) {
        if config.session.worker_threads == 0 {
            result.add_error(ValidationError::new(
                "session.worker_threads",
                "worker_threads must be greater than 0",
            ));
        }

        if config.session.worker_threads > 64 {
            result.add_warning(ValidationWarning::new(
                "session.worker_threads",
                "worker_threads is very high (>64); the automation surface rarely benefits",
            ));
        }

        if config.session.worker_name_prefix.trim().is_empty() {
            result.add_error(ValidationError::new(
                "session.worker_name_prefix",
                "Worker name prefix cannot be empty",
            ));
        }
    }

    fn validate_lifecycle(config: &Config, result: &mut ValidationResult) {
        if config.lifecycle.forced_sweep_timeout_secs == 0 {
            result.add_error(ValidationError::new(
                "lifecycle.forced_sweep_timeout_secs",
                "forced_sweep_timeout_secs must be greater than 0",
            ));
        }

        if config.lifecycle.release_pause_ms > 10_000 {
            result.add_warning(ValidationWarning::new(
                "lifecycle.release_pause_ms",
                "release_pause_ms is above 10s; shutting down many listeners will be slow",
            ));
        }
    }

    fn validate_retry(config: &Config, result: &mut ValidationResult) {
        if config.retry.attempts == 0 {
            result.add_error(ValidationError::new(
                "retry.attempts",
                "attempts must be greater than 0",
            ));
        }

        if config.retry.interval_ms == 0 {
            result.add_warning(ValidationWarning::new(
                "retry.interval_ms",
                "interval_ms is 0; retries will hammer the automation surface",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let level = config.logging.level.to_ascii_lowercase();
        // Full filter directives ("chatpilot_core=debug") are passed through untouched.
        if !level.contains('=') && !KNOWN_LEVELS.contains(&level.as_str()) {
            result.add_error(ValidationError::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    config.logging.level, KNOWN_LEVELS
                ),
            ));
        }

        if config.logging.max_files == 0 {
            result.add_warning(ValidationWarning::new(
                "logging.max_files",
                "max_files is 0; rolled log files will never be pruned",
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
