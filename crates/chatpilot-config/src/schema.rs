//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub lifecycle: LifecycleSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Automation session and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Number of dedicated worker threads that may call the driver.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Thread name prefix for workers (`<prefix>-<n>`).
    #[serde(default = "default_worker_name_prefix")]
    pub worker_name_prefix: String,

    /// Install the process-exit and signal sweep hooks.
    #[serde(default = "default_true")]
    pub exit_hooks: bool,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            worker_name_prefix: default_worker_name_prefix(),
            exit_hooks: true,
        }
    }
}

fn default_worker_threads() -> usize {
    5
}

fn default_worker_name_prefix() -> String {
    "surface-worker".to_string()
}

fn default_true() -> bool {
    true
}

/// Listener release settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSection {
    /// Pause between consecutive listener releases, in milliseconds.
    #[serde(default = "default_release_pause_ms")]
    pub release_pause_ms: u64,

    /// Upper bound on a forced (process exit) sweep, in seconds.
    #[serde(default = "default_forced_sweep_timeout_secs")]
    pub forced_sweep_timeout_secs: u64,
}

impl Default for LifecycleSection {
    fn default() -> Self {
        Self {
            release_pause_ms: default_release_pause_ms(),
            forced_sweep_timeout_secs: default_forced_sweep_timeout_secs(),
        }
    }
}

fn default_release_pause_ms() -> u64 {
    500
}

fn default_forced_sweep_timeout_secs() -> u64 {
    10
}

/// Default retry policy for multi-step primary-surface operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,

    #[serde(default = "default_retry_interval_ms")]
    pub interval_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    2000
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files.
    #[serde(default = "default_log_directory")]
    pub directory: String,

    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,

    /// Number of daily log files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default = "default_true")]
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_log_prefix(),
            max_files: default_max_files(),
            ansi: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "~/.chatpilot/logs".to_string()
}

fn default_log_prefix() -> String {
    "chatpilot".to_string()
}

fn default_max_files() -> usize {
    30
}
