//! Per-conversation locks for sub-surface operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::error::SessionError;

struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    retired: AtomicBool,
}

impl Slot {
    fn new() -> Self {
        Self {
            lock: Arc::new(tokio::sync::Mutex::new(())),
            retired: AtomicBool::new(false),
        }
    }
}

/// Held for the full duration of one sub-surface operation.
pub struct SubSurfaceGuard {
    id: String,
    _guard: OwnedMutexGuard<()>,
}

impl SubSurfaceGuard {
    /// Sub-surface identity this guard covers.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Lazily grown table of one lock per sub-surface identity.
///
/// A slot is deleted only while its lock is held, and a waiter that wakes
/// on a deleted slot looks the identity up again, so two operations on the
/// same identity never overlap even across deletion.
pub struct SubSurfaceLocks {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
    closed: AtomicBool,
}

impl SubSurfaceLocks {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn resolve(&self, id: &str) -> Result<Arc<Slot>, SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::ShutDown);
        }
        let mut slots = self.slots.lock();
        let slot = slots.entry(id.to_string()).or_insert_with(|| {
            debug!("Created sub-surface lock for '{}'", id);
            Arc::new(Slot::new())
        });
        Ok(slot.clone())
    }

    /// Wait for exclusive access to `id`, creating its lock on first use.
    pub async fn acquire(&self, id: &str) -> Result<SubSurfaceGuard, SessionError> {
        loop {
            let slot = self.resolve(id)?;
            let guard = slot.lock.clone().lock_owned().await;
            if slot.retired.load(Ordering::SeqCst) {
                continue;
            }
            return Ok(SubSurfaceGuard {
                id: id.to_string(),
                _guard: guard,
            });
        }
    }

    /// Delete the lock for `id` once no operation holds it.
    pub async fn retire(&self, id: &str) {
        let slot = self.slots.lock().get(id).cloned();
        let Some(slot) = slot else {
            return;
        };

        let _held = slot.lock.lock().await;
        slot.retired.store(true, Ordering::SeqCst);

        let mut slots = self.slots.lock();
        if slots.get(id).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
            slots.remove(id);
            debug!("Retired sub-surface lock for '{}'", id);
        }
    }

    /// Refuse new acquisitions and drop every slot.
    ///
    /// Operations already holding a guard finish normally; waiters fail with
    /// [`SessionError::ShutDown`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut slots = self.slots.lock();
        for slot in slots.values() {
            slot.retired.store(true, Ordering::SeqCst);
        }
        let count = slots.len();
        slots.clear();
        debug!("Sub-surface lock table closed ({} slots dropped)", count);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slots.lock().contains_key(id)
    }
}

impl Default for SubSurfaceLocks {
    fn default() -> Self {
        Self::new()
    }
}
