//! Session and substrate errors.

use thiserror::Error;

use crate::driver::DriverError;

/// Errors raised by the session substrate itself.
///
/// Operation failures belong to the collaborator's own error type; the
/// substrate only converts into it through `From<SessionError>`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is releasing or released.
    #[error("Session is shut down")]
    ShutDown,

    /// Thread-local environment initialization failed on a worker.
    #[error("Environment initialization failed on {worker}: {reason}")]
    EnvironmentInit { worker: String, reason: String },

    /// The worker pool no longer accepts jobs.
    #[error("Worker pool is stopped")]
    WorkerPoolStopped,

    /// A blocking call panicked on its worker.
    #[error("Blocking call panicked: {0}")]
    Panicked(String),

    /// An operation was dropped by the pump before producing a result.
    #[error("Operation '{0}' aborted before completing")]
    Aborted(String),

    /// Driver construction failed during session setup.
    #[error("Failed to connect automation driver: {0}")]
    Connect(String),

    /// The call does not fit its operation's classification.
    #[error("Invalid route for operation '{operation}': {reason}")]
    InvalidRoute { operation: String, reason: String },

    /// The same operation name was used with two different kinds.
    #[error("Operation '{operation}' is classified as {registered}, not {requested}")]
    ClassificationConflict {
        operation: String,
        registered: String,
        requested: String,
    },

    /// A synchronous wait exceeded its bound.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Process hook installation failed.
    #[error("Failed to install process hooks: {0}")]
    HookSetup(String),

    /// Driver error surfaced by a substrate-owned operation.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Worker thread spawn failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the error comes from the queue/lock/worker infrastructure
    /// rather than from a driver call.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(self, SessionError::Driver(_))
    }
}
