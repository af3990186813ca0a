//! Strict FIFO queue for primary-surface operations.
//!
//! At most one primary-surface operation runs at a time. Submissions are
//! ordered at the moment [`PrimaryQueue::enqueue`] returns, and a single pump
//! task drains them in that order while holding the global guard. The pump
//! starts when the first entry arrives and goes idle again once the queue
//! empties.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, trace, warn};

use crate::error::SessionError;
use crate::worker::panic_message;

/// Resolves to `true` if the operation panicked.
type BoxedJob = Pin<Box<dyn Future<Output = bool> + Send + 'static>>;

struct Pending {
    sequence: u64,
    name: String,
    job: BoxedJob,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Pending>,
    pumping: bool,
    closed: bool,
    next_sequence: u64,
}

struct QueueInner {
    state: Mutex<QueueState>,
    guard: tokio::sync::Mutex<()>,
    idle: Notify,
    processed: AtomicU64,
    panicked: AtomicU64,
    runtime: Handle,
}

/// Serialized queue of primary-surface operations for one session.
#[derive(Clone)]
pub struct PrimaryQueue {
    inner: Arc<QueueInner>,
}

impl PrimaryQueue {
    /// Create an idle queue whose pump runs on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                guard: tokio::sync::Mutex::new(()),
                idle: Notify::new(),
                processed: AtomicU64::new(0),
                panicked: AtomicU64::new(0),
                runtime,
            }),
        }
    }

    /// Append an operation to the tail of the queue.
    ///
    /// The position is fixed when this returns. The operation runs even if
    /// the returned [`Completion`] is dropped.
    pub fn enqueue<F, T>(&self, name: &str, operation: F) -> Result<Completion<T>, SessionError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let label = name.to_string();

        let job_name = label.clone();
        let job: BoxedJob = Box::pin(async move {
            let result = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(value) => Ok(value),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!("Primary-surface operation '{}' panicked: {}", job_name, message);
                    Err(SessionError::Panicked(message))
                }
            };
            let panicked = result.is_err();
            let _ = tx.send(result);
            panicked
        });

        let start_pump = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(SessionError::ShutDown);
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.entries.push_back(Pending {
                sequence,
                name: label.clone(),
                job,
            });
            trace!("Queued primary-surface operation #{} '{}'", sequence, label);

            let idle = !state.pumping;
            state.pumping = true;
            idle
        };

        if start_pump {
            let pump_state = PumpState {
                inner: self.inner.clone(),
                finished: false,
            };
            // A runtime that has shut down drops the pump unpolled, which
            // resets the queue through `PumpState::drop`.
            self.inner.runtime.spawn(pump(pump_state));
        }

        Ok(Completion { name: label, rx })
    }

    /// Refuse further submissions. Entries already queued still run.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        if !state.closed {
            state.closed = true;
            debug!(
                "Primary queue closed with {} pending operations",
                state.entries.len()
            );
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Whether the pump is currently draining the queue.
    pub fn is_pumping(&self) -> bool {
        self.inner.state.lock().pumping
    }

    /// Operations waiting behind the one in progress.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Operations finished since the queue was created.
    pub fn processed(&self) -> u64 {
        self.inner.processed.load(Ordering::SeqCst)
    }

    /// Operations that panicked.
    pub fn panicked(&self) -> u64 {
        self.inner.panicked.load(Ordering::SeqCst)
    }

    /// Wait until the queue is empty and the pump is idle.
    pub async fn drained(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.inner.state.lock();
                if !state.pumping && state.entries.is_empty() {
                    return;
                }
            }

            notified.await;
        }
    }

    /// Take the global guard without waiting.
    ///
    /// Used by synchronous sweeps that cannot await the pump.
    pub fn try_hold(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.inner.guard.try_lock().ok()
    }
}

/// Owned by the pump task. Dropping it before the pump finishes marks the
/// queue idle and aborts every entry still waiting.
struct PumpState {
    inner: Arc<QueueInner>,
    finished: bool,
}

impl Drop for PumpState {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let abandoned = {
            let mut state = self.inner.state.lock();
            state.pumping = false;
            std::mem::take(&mut state.entries)
        };
        if !abandoned.is_empty() {
            warn!(
                "Primary queue pump stopped with {} operations pending",
                abandoned.len()
            );
        }
        drop(abandoned);
        self.inner.idle.notify_waiters();
    }
}

async fn pump(mut pump_state: PumpState) {
    debug!("Primary queue pump started");
    let inner = pump_state.inner.clone();
    loop {
        let next = {
            let mut state = inner.state.lock();
            match state.entries.pop_front() {
                Some(entry) => entry,
                None => {
                    state.pumping = false;
                    pump_state.finished = true;
                    break;
                }
            }
        };

        let _guard = inner.guard.lock().await;
        trace!(
            "Running primary-surface operation #{} '{}'",
            next.sequence, next.name
        );
        if next.job.await {
            inner.panicked.fetch_add(1, Ordering::SeqCst);
        }
        inner.processed.fetch_add(1, Ordering::SeqCst);
    }
    inner.idle.notify_waiters();
    debug!("Primary queue pump idle");
}

/// Result of a queued operation.
///
/// Resolves to [`SessionError::Aborted`] if the operation was dropped
/// without running, for example when the runtime shuts down.
pub struct Completion<T> {
    name: String,
    rx: oneshot::Receiver<Result<T, SessionError>>,
}

impl<T> Future for Completion<T> {
    type Output = Result<T, SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SessionError::Aborted(self.name.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
