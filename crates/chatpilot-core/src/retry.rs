//! Bounded retry for operations whose return value is a weak success signal.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Pause between attempts. Not applied after the last one.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Total sleep time when every attempt fails.
    pub fn worst_case_delay(&self) -> Duration {
        self.interval * self.attempts.saturating_sub(1)
    }
}

/// Maps an attempt's result to success or a retryable failure.
pub trait RetryOutcome {
    type Value;

    fn into_success(self) -> Result<Self::Value, String>;
}

impl RetryOutcome for bool {
    type Value = bool;

    fn into_success(self) -> Result<bool, String> {
        if self {
            Ok(true)
        } else {
            Err("returned false".to_string())
        }
    }
}

impl RetryOutcome for () {
    type Value = ();

    fn into_success(self) -> Result<(), String> {
        Ok(())
    }
}

impl<T> RetryOutcome for Option<T> {
    type Value = T;

    fn into_success(self) -> Result<T, String> {
        self.ok_or_else(|| "returned nothing".to_string())
    }
}

impl<T, E> RetryOutcome for Result<T, E>
where
    T: RetryOutcome,
    E: Display,
{
    type Value = T::Value;

    fn into_success(self) -> Result<T::Value, String> {
        match self {
            Ok(value) => value.into_success(),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Run `op` up to `policy.attempts` times and return the first success.
///
/// Returns `None` once every attempt failed.
pub async fn retry<F, Fut, R>(policy: &RetryPolicy, name: &str, mut op: F) -> Option<R::Value>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = R>,
    R: RetryOutcome,
{
    if policy.attempts == 0 {
        debug!("Retry of '{}' configured with zero attempts", name);
        return None;
    }

    for attempt in 1..=policy.attempts {
        match op().await.into_success() {
            Ok(value) => {
                if attempt > 1 {
                    debug!("'{}' succeeded on attempt {}/{}", name, attempt, policy.attempts);
                }
                return Some(value);
            }
            Err(reason) if attempt < policy.attempts => {
                warn!(
                    "'{}' failed (attempt {}/{}): {}, retrying in {:?}",
                    name, attempt, policy.attempts, reason, policy.interval
                );
                sleep(policy.interval).await;
            }
            Err(reason) => {
                warn!(
                    "'{}' failed after {} attempts: {}",
                    name, policy.attempts, reason
                );
            }
        }
    }

    None
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
