//! Runtime settings for an automation session.

use std::time::Duration;

use chatpilot_config::Config;

use crate::retry::RetryPolicy;

/// Session settings derived from the loaded configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Number of dedicated worker threads.
    pub worker_threads: usize,

    /// Worker thread name prefix.
    pub worker_name_prefix: String,

    /// Pause between consecutive listener releases.
    pub release_pause: Duration,

    /// Bound on the synchronous sweep run by the finalizer and exit hooks.
    pub forced_sweep_timeout: Duration,

    /// Default policy for [`OperationContext::retry`](crate::OperationContext::retry).
    pub retry: RetryPolicy,

    /// Install process exit and signal hooks on connect.
    pub exit_hooks: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            worker_threads: config.session.worker_threads,
            worker_name_prefix: config.session.worker_name_prefix.clone(),
            release_pause: Duration::from_millis(config.lifecycle.release_pause_ms),
            forced_sweep_timeout: Duration::from_secs(config.lifecycle.forced_sweep_timeout_secs),
            retry: RetryPolicy::new(
                config.retry.attempts,
                Duration::from_millis(config.retry.interval_ms),
            ),
            exit_hooks: config.session.exit_hooks,
        }
    }
}

impl SessionConfig {
    /// Settings for tests: two workers, no pauses, no process hooks.
    pub fn for_tests() -> Self {
        Self {
            worker_threads: 2,
            release_pause: Duration::ZERO,
            forced_sweep_timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(3, Duration::from_millis(10)),
            exit_hooks: false,
            ..Self::default()
        }
    }
}
