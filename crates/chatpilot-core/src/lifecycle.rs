//! Session lifecycle states and the process-wide live instance registry.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::worker::panic_message;

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    /// Accepting operations.
    Active = 0,
    /// A release tier is sweeping listeners.
    Releasing = 1,
    /// Terminal.
    Released = 2,
}

impl From<u8> for SessionState {
    fn from(v: u8) -> Self {
        match v {
            0 => SessionState::Active,
            1 => SessionState::Releasing,
            _ => SessionState::Released,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::Releasing => write!(f, "releasing"),
            SessionState::Released => write!(f, "released"),
        }
    }
}

/// Which exit path triggered a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTier {
    /// Explicit call or end of a managed scope.
    Scoped,
    /// The owning session was dropped while still active.
    Finalizer,
    /// Process exit or termination signal.
    Forced,
}

impl fmt::Display for ReleaseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseTier::Scoped => write!(f, "scoped"),
            ReleaseTier::Finalizer => write!(f, "finalizer"),
            ReleaseTier::Forced => write!(f, "forced"),
        }
    }
}

/// A session that can be released synchronously from any thread.
pub trait ForcedRelease: Send + Sync {
    fn instance_id(&self) -> u64;

    fn is_active(&self) -> bool;

    /// Release every listener without awaiting. Must not block longer than
    /// the session's forced sweep timeout.
    fn force_release(&self);
}

/// Weak set of live sessions walked by the forced sweep.
///
/// Membership never keeps a session alive.
pub struct LiveRegistry {
    entries: Mutex<Vec<(u64, Weak<dyn ForcedRelease>)>>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Process-wide registry swept by the exit and signal hooks.
    pub fn global() -> Arc<LiveRegistry> {
        static GLOBAL: OnceLock<Arc<LiveRegistry>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(LiveRegistry::new())).clone()
    }

    pub fn insert(&self, id: u64, instance: Weak<dyn ForcedRelease>) {
        let mut entries = self.entries.lock();
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        entries.push((id, instance));
        debug!("Session {} joined live registry ({} entries)", id, entries.len());
    }

    pub fn remove(&self, id: u64) {
        self.entries.lock().retain(|(entry, _)| *entry != id);
    }

    /// Number of registered sessions that are still alive.
    pub fn live_count(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    /// Force-release every active session and prune the registry.
    ///
    /// Never panics; a failing release is logged and the sweep moves on.
    /// Returns the number of sessions released.
    pub fn sweep(&self, reason: &str) -> usize {
        let snapshot: Vec<Arc<dyn ForcedRelease>> = self
            .entries
            .lock()
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();

        let mut released = 0;
        for instance in snapshot.iter().filter(|i| i.is_active()) {
            let id = instance.instance_id();
            match panic::catch_unwind(AssertUnwindSafe(|| instance.force_release())) {
                Ok(()) => released += 1,
                Err(payload) => {
                    error!(
                        "Forced release of session {} panicked: {}",
                        id,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        self.entries.lock().retain(|(_, weak)| {
            weak.upgrade().is_some_and(|instance| instance.is_active())
        });

        if released > 0 {
            info!("Forced sweep ({}) released {} sessions", reason, released);
        }
        released
    }
}

impl Default for LiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}
