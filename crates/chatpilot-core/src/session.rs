//! Automation session: routing, listener registration and the three release
//! tiers.
//!
//! An [`AutomationSession`] owns one driver connection. Operations reach the
//! driver only through [`SessionHandle::dispatch`], which routes each call by
//! its [`OperationKind`]:
//!
//! - primary-surface calls go through the FIFO [`PrimaryQueue`],
//! - sub-surface calls take the conversation's lock,
//! - utility calls run inline and may compose other calls.
//!
//! Listeners are released by [`SessionHandle::release`] (scoped tier), by
//! `Drop` of the owning session (finalizer tier) or by the process-wide
//! [`LiveRegistry`] sweep (forced tier). Every tier starts with the same
//! `Active -> Releasing` transition, so only the first one does any work.

use std::future::Future;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::driver::{DriverError, SurfaceDriver};
use crate::environment::{NoopEnvironment, ThreadEnvironment};
use crate::error::SessionError;
use crate::lifecycle::{ForcedRelease, LiveRegistry, ReleaseTier, SessionState};
use crate::locks::SubSurfaceLocks;
use crate::operation::{OperationCatalog, OperationDescriptor, OperationKind, Route};
use crate::queue::PrimaryQueue;
use crate::retry::{RetryOutcome, RetryPolicy, retry};
use crate::signal::install_process_hooks;
use crate::worker::{WorkerPool, panic_message};

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

const ADD_LISTENER: OperationDescriptor = OperationDescriptor::primary("add_listener");
const REMOVE_LISTENER: OperationDescriptor = OperationDescriptor::primary("remove_listener");

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Poll interval while a synchronous release waits for the primary guard.
const HOLD_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Result of releasing one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// Removed, and the driver no longer reports it.
    Released,
    /// Removal returned success but the driver still reports the listener.
    Unconfirmed,
    /// Nothing to release.
    NotRegistered,
}

/// Summary of a session-wide listener sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReleaseReport {
    pub released: Vec<String>,
    pub unconfirmed: Vec<String>,
    pub failed: Vec<String>,
}

impl ReleaseReport {
    /// No removal failed.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, session: u64, id: &str, outcome: Result<ReleaseOutcome, String>) {
        match outcome {
            Ok(ReleaseOutcome::Released) => self.released.push(id.to_string()),
            Ok(ReleaseOutcome::Unconfirmed) => {
                warn!(
                    "Session {}: listener '{}' still reported after removal",
                    session, id
                );
                self.unconfirmed.push(id.to_string());
            }
            Ok(ReleaseOutcome::NotRegistered) => {
                trace!("Session {}: listener '{}' already gone", session, id);
            }
            Err(e) => {
                warn!("Session {}: failed to release listener '{}': {}", session, id, e);
                self.failed.push(id.to_string());
            }
        }
    }
}

/// Point-in-time session counters.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub id: u64,
    pub state: SessionState,
    pub connected: bool,
    pub registrations: usize,
    pub queue_pending: usize,
    pub queue_processed: u64,
    pub queue_panicked: u64,
    pub lock_slots: usize,
    pub workers: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
}

/// Remove one listener and check the driver no longer reports it.
fn release_listener<D: SurfaceDriver>(driver: &D, id: &str) -> Result<ReleaseOutcome, DriverError> {
    if !driver.listeners().iter().any(|l| l == id) {
        return Ok(ReleaseOutcome::NotRegistered);
    }
    driver.remove_listener(id)?;
    if driver.listeners().iter().any(|l| l == id) {
        Ok(ReleaseOutcome::Unconfirmed)
    } else {
        Ok(ReleaseOutcome::Released)
    }
}

/// Tracked registrations first, then anything else the driver reports.
fn merge_targets(mut tracked: Vec<String>, live: Vec<String>) -> Vec<String> {
    for id in live {
        if !tracked.contains(&id) {
            tracked.push(id);
        }
    }
    tracked
}

/// Blocking sweep run on a single worker by the finalizer and forced tiers.
fn sweep_listeners<D: SurfaceDriver>(
    session: u64,
    driver: &D,
    tracked: Vec<String>,
    pause: Duration,
) -> ReleaseReport {
    let mut report = ReleaseReport::default();
    let targets = merge_targets(tracked, driver.listeners());
    for (index, id) in targets.iter().enumerate() {
        if index > 0 && !pause.is_zero() {
            thread::sleep(pause);
        }
        let outcome = release_listener(driver, id).map_err(|e| e.to_string());
        report.record(session, id, outcome);
    }
    report
}

struct SessionInner<D: SurfaceDriver> {
    id: u64,
    config: SessionConfig,
    driver: Arc<D>,
    pool: Arc<WorkerPool>,
    queue: PrimaryQueue,
    locks: Arc<SubSurfaceLocks>,
    registrations: Mutex<Vec<String>>,
    state: AtomicU8,
    connected: AtomicBool,
    registry: Arc<LiveRegistry>,
    catalog: OperationCatalog,
    runtime: Handle,
}

impl<D: SurfaceDriver> SessionInner<D> {
    fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    fn ensure_active(&self) -> Result<(), SessionError> {
        if self.state() == SessionState::Active {
            Ok(())
        } else {
            Err(SessionError::ShutDown)
        }
    }

    /// The single entry into every release tier.
    fn begin_release(&self, tier: ReleaseTier) -> bool {
        let won = self
            .state
            .compare_exchange(
                SessionState::Active as u8,
                SessionState::Releasing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if won {
            info!("Releasing session {} ({} tier)", self.id, tier);
        } else {
            debug!(
                "Session {} already {}; skipping {} release",
                self.id,
                self.state(),
                tier
            );
        }
        won
    }

    fn finish_release(&self, tier: ReleaseTier) {
        self.registrations.lock().clear();
        self.connected.store(false, Ordering::SeqCst);
        self.state
            .store(SessionState::Released as u8, Ordering::SeqCst);
        self.registry.remove(self.id);
        info!("Session {} released ({} tier)", self.id, tier);
    }

    fn track(&self, id: &str) {
        let mut registrations = self.registrations.lock();
        if !registrations.iter().any(|r| r == id) {
            registrations.push(id.to_string());
        }
    }

    fn untrack(&self, id: &str) {
        self.registrations.lock().retain(|r| r != id);
    }

    /// Run one blocking driver call as a primary-surface operation,
    /// bypassing the session state check. Used by the scoped release.
    async fn primary_blocking<F, T>(&self, name: &str, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&D) -> T + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        let driver = self.driver.clone();
        self.queue
            .enqueue(name, async move { pool.run_blocking(move || f(&driver)).await })?
            .await?
    }

    /// Synchronous sweep for the finalizer and forced tiers. Never joins the
    /// workers. Waits at most `forced_sweep_timeout` for the primary guard,
    /// and as long again for the sweep itself.
    fn release_blocking(&self, tier: ReleaseTier) {
        if !self.begin_release(tier) {
            return;
        }

        self.queue.close();
        let held = self.hold_primary(tier);
        self.locks.close();

        let id = self.id;
        let driver = self.driver.clone();
        let tracked = self.registrations.lock().clone();
        let pause = self.config.release_pause;
        let result = self.pool.run_blocking_sync(
            move || sweep_listeners(id, &*driver, tracked, pause),
            Some(self.config.forced_sweep_timeout),
        );
        drop(held);

        match result {
            Ok(report) => debug!(
                "Session {}: {} release removed {} listeners ({} unconfirmed, {} failed)",
                id,
                tier,
                report.released.len(),
                report.unconfirmed.len(),
                report.failed.len()
            ),
            Err(e) => warn!("Session {}: {} release incomplete: {}", id, tier, e),
        }

        self.pool.shutdown();
        self.finish_release(tier);
    }

    /// Wait for an in-flight primary-surface operation to give up the guard.
    fn hold_primary(&self, tier: ReleaseTier) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        let deadline = Instant::now() + self.config.forced_sweep_timeout;
        loop {
            if let Some(guard) = self.queue.try_hold() {
                return Some(guard);
            }
            if Instant::now() >= deadline {
                warn!(
                    "Session {}: primary operation still running after {:?}; {} release proceeds without the guard",
                    self.id, self.config.forced_sweep_timeout, tier
                );
                return None;
            }
            thread::sleep(HOLD_POLL_INTERVAL);
        }
    }
}

impl<D: SurfaceDriver> ForcedRelease for SessionInner<D> {
    fn instance_id(&self) -> u64 {
        self.id
    }

    fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    fn force_release(&self) {
        self.release_blocking(ReleaseTier::Forced);
    }
}

/// Builder for [`AutomationSession`].
pub struct SessionBuilder {
    config: SessionConfig,
    environment: Arc<dyn ThreadEnvironment>,
    registry: Option<Arc<LiveRegistry>>,
}

impl SessionBuilder {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            environment: Arc::new(NoopEnvironment),
            registry: None,
        }
    }

    /// Per-worker setup run before the driver is created.
    pub fn environment(mut self, environment: impl ThreadEnvironment) -> Self {
        self.environment = Arc::new(environment);
        self
    }

    /// Track the session in `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: Arc<LiveRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn exit_hooks(mut self, enabled: bool) -> Self {
        self.config.exit_hooks = enabled;
        self
    }

    /// Start the workers and build the driver on one of them.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn connect<D, F>(self, factory: F) -> Result<AutomationSession<D>, SessionError>
    where
        D: SurfaceDriver,
        F: FnOnce() -> Result<D, DriverError> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|e| SessionError::Connect(e.to_string()))?;

        let pool = Arc::new(WorkerPool::start(
            self.config.worker_threads,
            &self.config.worker_name_prefix,
            self.environment,
        )?);

        let driver = match pool.run_blocking(factory).await {
            Ok(Ok(driver)) => Arc::new(driver),
            Ok(Err(e)) => {
                pool.shutdown();
                return Err(SessionError::Connect(e.to_string()));
            }
            Err(e) => {
                pool.shutdown();
                return Err(e);
            }
        };

        if self.config.exit_hooks {
            if let Err(e) = install_process_hooks() {
                warn!("Continuing without process hooks: {}", e);
            }
        }

        let registry = self.registry.unwrap_or_else(LiveRegistry::global);
        let inner = Arc::new(SessionInner {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst),
            config: self.config,
            driver,
            pool,
            queue: PrimaryQueue::new(runtime.clone()),
            locks: Arc::new(SubSurfaceLocks::new()),
            registrations: Mutex::new(Vec::new()),
            state: AtomicU8::new(SessionState::Active as u8),
            connected: AtomicBool::new(true),
            registry,
            catalog: OperationCatalog::new(),
            runtime,
        });

        let weak: Weak<dyn ForcedRelease> = Arc::downgrade(&inner) as Weak<dyn ForcedRelease>;
        inner.registry.insert(inner.id, weak);

        info!(
            "Session {} connected with {} workers",
            inner.id,
            inner.pool.size()
        );

        Ok(AutomationSession {
            handle: SessionHandle { inner },
        })
    }
}

/// The owning side of a session.
///
/// Dropping it while still active runs the finalizer release tier.
pub struct AutomationSession<D: SurfaceDriver> {
    handle: SessionHandle<D>,
}

impl<D: SurfaceDriver> AutomationSession<D> {
    /// Connect with default settings.
    pub async fn connect<F>(config: SessionConfig, factory: F) -> Result<Self, SessionError>
    where
        F: FnOnce() -> Result<D, DriverError> + Send + 'static,
    {
        SessionBuilder::new(config).connect(factory).await
    }

    /// A cloneable handle that does not own the session.
    pub fn handle(&self) -> SessionHandle<D> {
        self.handle.clone()
    }

    /// Run `body`, then release the session.
    pub async fn run_scoped<F, Fut, T>(self, body: F) -> T
    where
        F: FnOnce(SessionHandle<D>) -> Fut,
        Fut: Future<Output = T>,
    {
        let value = body(self.handle.clone()).await;
        self.handle.release().await;
        value
    }
}

impl<D: SurfaceDriver> Deref for AutomationSession<D> {
    type Target = SessionHandle<D>;

    fn deref(&self) -> &SessionHandle<D> {
        &self.handle
    }
}

impl<D: SurfaceDriver> Drop for AutomationSession<D> {
    fn drop(&mut self) {
        let inner = &self.handle.inner;
        if inner.state() == SessionState::Active {
            warn!(
                "Session {} dropped while active; releasing from finalizer",
                inner.id
            );
            inner.release_blocking(ReleaseTier::Finalizer);
        }
    }
}

/// Shared handle used by operations and spawned tasks.
pub struct SessionHandle<D: SurfaceDriver> {
    inner: Arc<SessionInner<D>>,
}

impl<D: SurfaceDriver> Clone for SessionHandle<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: SurfaceDriver> SessionHandle<D> {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Conversations with a registered listener, in registration order.
    pub fn registrations(&self) -> Vec<String> {
        self.inner.registrations.lock().clone()
    }

    /// Classify and run an operation.
    ///
    /// The body receives an [`OperationContext`], the only way to reach the
    /// driver. Once a primary-surface operation is queued, or a sub-surface
    /// operation holds its lock, it runs to completion even if this future
    /// is dropped.
    pub async fn dispatch<F, Fut, T, E>(
        &self,
        operation: OperationDescriptor,
        sub_id: Option<&str>,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce(OperationContext<D>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<SessionError> + Send + 'static,
    {
        let route = operation.route(sub_id)?;
        self.inner.catalog.check(&operation)?;
        self.inner.ensure_active()?;

        match route {
            Route::Primary => {
                let context = OperationContext::new(self.clone(), operation, None);
                let completion = self
                    .inner
                    .queue
                    .enqueue(operation.name, async move { body(context).await })?;
                completion.await.unwrap_or_else(|e| Err(E::from(e)))
            }
            Route::SubSurface(id) => {
                let id = id.to_string();
                let locks = self.inner.locks.clone();
                let context = OperationContext::new(self.clone(), operation, Some(id.clone()));
                let task = self.inner.runtime.spawn(async move {
                    let _guard = locks.acquire(&id).await?;
                    context.session.inner.ensure_active()?;
                    trace!("Running sub-surface operation '{}' on '{}'", operation.name, id);
                    body(context).await
                });
                match task.await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => {
                        let message = panic_message(e.into_panic().as_ref());
                        warn!(
                            "Sub-surface operation '{}' panicked: {}",
                            operation.name, message
                        );
                        Err(E::from(SessionError::Panicked(message)))
                    }
                    Err(_) => Err(E::from(SessionError::Aborted(operation.name.to_string()))),
                }
            }
            Route::Utility => {
                body(OperationContext::new(self.clone(), operation, None)).await
            }
        }
    }

    /// One blocking call as a primary-surface operation.
    pub async fn run_primary<F, T>(&self, name: &'static str, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&D) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(OperationDescriptor::primary(name), None, move |ctx| async move {
            ctx.call(f).await
        })
        .await
    }

    /// One blocking call under the lock of conversation `id`.
    pub async fn run_sub_surface<F, T>(
        &self,
        name: &'static str,
        id: &str,
        f: F,
    ) -> Result<T, SessionError>
    where
        F: FnOnce(&D) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(OperationDescriptor::sub_surface(name), Some(id), move |ctx| async move {
            ctx.call(f).await
        })
        .await
    }

    /// Run a utility body that composes other operations.
    pub async fn run_utility<F, Fut, T>(&self, name: &'static str, body: F) -> Result<T, SessionError>
    where
        F: FnOnce(OperationContext<D>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, SessionError>> + Send + 'static,
        T: Send + 'static,
    {
        self.dispatch(OperationDescriptor::utility(name), None, body).await
    }

    /// Open a listener for conversation `id`.
    pub async fn register_resource(&self, id: &str) -> Result<(), SessionError> {
        if id.is_empty() {
            return Err(SessionError::InvalidRoute {
                operation: ADD_LISTENER.name.to_string(),
                reason: "conversation id must not be empty".to_string(),
            });
        }

        let key = id.to_string();
        self.dispatch(ADD_LISTENER, None, move |ctx| async move {
            let listener = key.clone();
            ctx.call(move |driver| driver.add_listener(&listener)).await??;
            ctx.session.inner.track(&key);
            debug!("Session {}: registered listener '{}'", ctx.session.id(), key);
            Ok::<_, SessionError>(())
        })
        .await
    }

    /// Close the listener for conversation `id` and drop its lock.
    ///
    /// Releasing an unknown id, or any id once the session is shut down,
    /// returns [`ReleaseOutcome::NotRegistered`].
    pub async fn release_resource(&self, id: &str) -> Result<ReleaseOutcome, SessionError> {
        if self.inner.state() != SessionState::Active {
            return Ok(ReleaseOutcome::NotRegistered);
        }

        let key = id.to_string();
        let result = self
            .dispatch(REMOVE_LISTENER, None, move |ctx| async move {
                let outcome = ctx.call(move |driver| release_listener(driver, &key)).await??;
                Ok::<_, SessionError>(outcome)
            })
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(SessionError::ShutDown) => return Ok(ReleaseOutcome::NotRegistered),
            Err(e) => return Err(e),
        };

        if outcome == ReleaseOutcome::Unconfirmed {
            warn!(
                "Session {}: listener '{}' still reported after removal",
                self.inner.id, id
            );
        }
        self.inner.untrack(id);
        self.inner.locks.retire(id).await;
        debug!("Session {}: released listener '{}' ({:?})", self.inner.id, id, outcome);
        Ok(outcome)
    }

    /// Scoped release: remove every listener, drain the queue and stop the
    /// workers.
    ///
    /// Returns `None` if another tier already released the session.
    pub async fn release(&self) -> Option<ReleaseReport> {
        let inner = &self.inner;
        if !inner.begin_release(ReleaseTier::Scoped) {
            return None;
        }

        let tracked = inner.registrations.lock().clone();
        let targets = match inner
            .primary_blocking(REMOVE_LISTENER.name, |driver| driver.listeners())
            .await
        {
            Ok(live) => merge_targets(tracked, live),
            Err(e) => {
                warn!(
                    "Session {}: could not list listeners, releasing tracked ones only: {}",
                    inner.id, e
                );
                tracked
            }
        };

        let mut report = ReleaseReport::default();
        for (index, id) in targets.iter().enumerate() {
            if index > 0 && !inner.config.release_pause.is_zero() {
                tokio::time::sleep(inner.config.release_pause).await;
            }
            let key = id.clone();
            let outcome = match inner
                .primary_blocking(REMOVE_LISTENER.name, move |driver| {
                    release_listener(driver, &key)
                })
                .await
            {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            report.record(inner.id, id, outcome);
            inner.untrack(id);
        }

        inner.queue.close();
        inner.queue.drained().await;
        inner.locks.close();

        inner.pool.shutdown();
        let pool = inner.pool.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || pool.join()).await {
            warn!("Session {}: joining workers failed: {}", inner.id, e);
        }

        inner.finish_release(ReleaseTier::Scoped);
        Some(report)
    }

    /// Scoped release reporting whether it ran and every removal succeeded.
    pub async fn terminate_gracefully(&self) -> bool {
        matches!(self.release().await, Some(report) if report.is_clean())
    }

    pub fn stats(&self) -> SessionStats {
        let inner = &self.inner;
        SessionStats {
            id: inner.id,
            state: inner.state(),
            connected: self.is_connected(),
            registrations: inner.registrations.lock().len(),
            queue_pending: inner.queue.pending(),
            queue_processed: inner.queue.processed(),
            queue_panicked: inner.queue.panicked(),
            lock_slots: inner.locks.len(),
            workers: inner.pool.size(),
            jobs_completed: inner.pool.jobs_completed(),
            jobs_failed: inner.pool.jobs_failed(),
        }
    }
}

/// What a classified operation body can do.
pub struct OperationContext<D: SurfaceDriver> {
    session: SessionHandle<D>,
    operation: OperationDescriptor,
    sub_surface: Option<String>,
}

impl<D: SurfaceDriver> OperationContext<D> {
    fn new(
        session: SessionHandle<D>,
        operation: OperationDescriptor,
        sub_surface: Option<String>,
    ) -> Self {
        Self {
            session,
            operation,
            sub_surface,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation.name
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind
    }

    /// Conversation id of a sub-surface operation.
    pub fn sub_surface(&self) -> Option<&str> {
        self.sub_surface.as_deref()
    }

    /// Session default retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.session.inner.config.retry
    }

    /// Run a blocking driver call on a worker.
    pub async fn call<F, T>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&D) -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.operation.kind == OperationKind::Utility {
            return Err(SessionError::InvalidRoute {
                operation: self.operation.name.to_string(),
                reason: "utility operations cannot call the driver".to_string(),
            });
        }
        let driver = self.session.inner.driver.clone();
        self.session.inner.pool.run_blocking(move || f(&driver)).await
    }

    /// Repeat a driver call until it reports success.
    pub async fn retry<F, R>(&self, name: &str, policy: &RetryPolicy, f: F) -> Option<R::Value>
    where
        F: Fn(&D) -> R + Send + Sync + 'static,
        R: RetryOutcome + Send + 'static,
    {
        let f = Arc::new(f);
        let context = self;
        retry(policy, name, move || {
            let f = f.clone();
            async move { context.call(move |driver: &D| (f.as_ref())(driver)).await }
        })
        .await
    }

    /// Handle for composing other classified calls. Utility bodies only.
    pub fn compose(&self) -> Result<SessionHandle<D>, SessionError> {
        if self.operation.kind == OperationKind::Utility {
            Ok(self.session.clone())
        } else {
            Err(SessionError::InvalidRoute {
                operation: self.operation.name.to_string(),
                reason: "only utility operations may compose other operations".to_string(),
            })
        }
    }
}
