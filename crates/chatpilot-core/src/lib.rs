//! # ChatPilot Core
//!
//! Concurrency and resource lifecycle substrate for driving a thread-affine
//! desktop chat client.
//!
//! ## Features
//!
//! - Worker pool with one-time per-thread environment setup
//! - Strict FIFO queue for primary-surface (main window) operations
//! - Per-conversation locks for sub-surface operations
//! - Scoped, finalizer and process-exit release of conversation listeners
//! - Bounded retry for operations with weak success signals

pub mod config;
pub mod driver;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod operation;
pub mod queue;
pub mod retry;
pub mod session;
pub mod signal;
pub mod worker;

pub use config::SessionConfig;
pub use driver::{DriverError, MemoryDriver, SurfaceDriver};
pub use environment::{EnvironmentError, FnEnvironment, NoopEnvironment, ThreadEnvironment};
#[cfg(windows)]
pub use environment::ComApartment;
pub use error::SessionError;
pub use lifecycle::{ForcedRelease, LiveRegistry, ReleaseTier, SessionState};
pub use locks::{SubSurfaceGuard, SubSurfaceLocks};
pub use operation::{OperationCatalog, OperationDescriptor, OperationKind, Route};
pub use queue::{Completion, PrimaryQueue};
pub use retry::{RetryOutcome, RetryPolicy, retry};
pub use session::{
    AutomationSession, OperationContext, ReleaseOutcome, ReleaseReport, SessionBuilder,
    SessionHandle, SessionStats,
};
pub use signal::install_process_hooks;
pub use worker::{Worker, WorkerPool};
