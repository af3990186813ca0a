//! Worker pool for blocking, thread-affine automation calls.
//!
//! Every worker is a dedicated OS thread that runs the session's
//! [`ThreadEnvironment`] once before pulling jobs from a shared channel.
//! Async callers get results through a oneshot; the synchronous path used
//! by finalizers and exit hooks waits on a plain channel instead.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::environment::ThreadEnvironment;
use crate::error::SessionError;

type Job = Box<dyn FnOnce(&Worker) + Send + 'static>;

#[derive(Default)]
struct PoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    busy: AtomicUsize,
    ready: AtomicUsize,
}

/// A single worker thread.
pub struct Worker {
    name: String,
    init_error: Option<String>,
    stats: Arc<PoolStats>,
}

impl Worker {
    /// Thread name of this worker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether thread environment initialization succeeded.
    pub fn is_ready(&self) -> bool {
        self.init_error.is_none()
    }

    fn execute<F, T>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce() -> T,
    {
        if let Some(reason) = &self.init_error {
            self.stats.jobs_failed.fetch_add(1, Ordering::SeqCst);
            return Err(SessionError::EnvironmentInit {
                worker: self.name.clone(),
                reason: reason.clone(),
            });
        }

        self.stats.busy.fetch_add(1, Ordering::SeqCst);
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        self.stats.busy.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(value) => {
                self.stats.jobs_completed.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
            Err(payload) => {
                self.stats.jobs_failed.fetch_add(1, Ordering::SeqCst);
                let message = panic_message(payload.as_ref());
                warn!("Blocking call panicked on {}: {}", self.name, message);
                Err(SessionError::Panicked(message))
            }
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn worker_loop(
    name: String,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    environment: Arc<dyn ThreadEnvironment>,
    stats: Arc<PoolStats>,
) {
    let init_error = match environment.init_thread() {
        Ok(()) => {
            stats.ready.fetch_add(1, Ordering::SeqCst);
            debug!("Worker {} initialized ({})", name, environment.name());
            None
        }
        Err(e) => {
            error!("Worker {} failed environment initialization: {}", name, e);
            Some(e.to_string())
        }
    };

    let worker = Worker {
        name,
        init_error,
        stats,
    };

    loop {
        let job = receiver.lock().recv();
        match job {
            Ok(job) => job(&worker),
            Err(_) => break,
        }
    }

    if worker.is_ready() {
        environment.teardown_thread();
        worker.stats.ready.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("Worker {} exiting", worker.name);
}

/// Fixed-size pool of initialized worker threads.
pub struct WorkerPool {
    size: usize,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawn `size` workers named `<name_prefix>-<n>`.
    pub fn start(
        size: usize,
        name_prefix: &str,
        environment: Arc<dyn ThreadEnvironment>,
    ) -> Result<Self, SessionError> {
        let size = size.max(1);
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let stats = Arc::new(PoolStats::default());

        let mut handles = Vec::with_capacity(size);
        for index in 0..size {
            let name = format!("{}-{}", name_prefix, index);
            let receiver = receiver.clone();
            let environment = environment.clone();
            let stats = stats.clone();
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(name, receiver, environment, stats))?;
            handles.push(handle);
        }

        info!(
            "Worker pool started with {} workers (environment: {})",
            size,
            environment.name()
        );

        Ok(Self {
            size,
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
            running: AtomicBool::new(true),
            stats,
        })
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check if the pool still accepts jobs.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Workers whose environment initialization succeeded.
    pub fn ready_workers(&self) -> usize {
        self.stats.ready.load(Ordering::SeqCst)
    }

    /// Workers currently running a job.
    pub fn busy_workers(&self) -> usize {
        self.stats.busy.load(Ordering::SeqCst)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.stats.jobs_completed.load(Ordering::SeqCst)
    }

    /// Jobs that panicked or hit a failed environment.
    pub fn jobs_failed(&self) -> u64 {
        self.stats.jobs_failed.load(Ordering::SeqCst)
    }

    fn dispatch<F, T, R>(&self, f: F, reply: R) -> Result<(), SessionError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
        R: FnOnce(Result<T, SessionError>) + Send + 'static,
    {
        let sender = self
            .sender
            .lock()
            .clone()
            .ok_or(SessionError::WorkerPoolStopped)?;

        let job: Job = Box::new(move |worker: &Worker| reply(worker.execute(f)));
        sender.send(job).map_err(|_| SessionError::WorkerPoolStopped)
    }

    /// Run a blocking call on a worker and await its result.
    ///
    /// Dropping the returned future does not cancel the call; its result is
    /// discarded.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.dispatch(f, move |result| {
            let _ = tx.send(result);
        })?;
        rx.await.map_err(|_| SessionError::WorkerPoolStopped)?
    }

    /// Run a blocking call on a worker, blocking the current thread.
    ///
    /// Must not be called from a worker of this pool.
    pub fn run_blocking_sync<F, T>(
        &self,
        f: F,
        timeout: Option<Duration>,
    ) -> Result<T, SessionError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        self.dispatch(f, move |result| {
            let _ = tx.send(result);
        })?;

        let received = match timeout {
            Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => {
                    SessionError::Timeout(format!("worker call after {:?}", limit))
                }
                mpsc::RecvTimeoutError::Disconnected => SessionError::WorkerPoolStopped,
            }),
            None => rx.recv().map_err(|_| SessionError::WorkerPoolStopped),
        };
        received?
    }

    /// Stop accepting jobs. Workers exit after their current job.
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            self.running.store(false, Ordering::SeqCst);
            info!("Worker pool stopped");
        }
    }

    /// Wait for every worker thread to exit. Call after [`shutdown`](Self::shutdown).
    pub fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self.handles.lock().drain(..).collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            if handle.join().is_err() {
                warn!("Worker {} terminated abnormally", name);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
