//! Automation driver seam.
//!
//! The driver is the opaque handle to the chat client's automation surface.
//! The substrate only needs the listener verbs below; collaborator verbs are
//! reached through closures that receive `&D` on a worker thread.

mod memory;

pub use memory::MemoryDriver;

use std::sync::Arc;

use thiserror::Error;

/// Driver call failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    /// No client window is reachable.
    #[error("Automation driver is not connected")]
    NotConnected,

    /// The conversation has no registered listener.
    #[error("No listener registered for '{0}'")]
    ListenerNotFound(String),

    /// Any other failure reported by the automation surface.
    #[error("Driver call failed: {0}")]
    Call(String),
}

/// Blocking, thread-affine automation driver.
///
/// Implementations are called only from initialized worker threads, and
/// possibly from several workers at once for different conversations, hence
/// `Sync`.
pub trait SurfaceDriver: Send + Sync + 'static {
    /// Open a listener (sub-surface) for a conversation.
    fn add_listener(&self, id: &str) -> Result<(), DriverError>;

    /// Close the listener for a conversation.
    fn remove_listener(&self, id: &str) -> Result<(), DriverError>;

    /// Conversations the client currently reports as listened.
    fn listeners(&self) -> Vec<String>;
}

impl<T: SurfaceDriver> SurfaceDriver for Arc<T> {
    fn add_listener(&self, id: &str) -> Result<(), DriverError> {
        (**self).add_listener(id)
    }

    fn remove_listener(&self, id: &str) -> Result<(), DriverError> {
        (**self).remove_listener(id)
    }

    fn listeners(&self) -> Vec<String> {
        (**self).listeners()
    }
}
