use super::*;
use std::sync::atomic::AtomicU32;

use crate::driver::MemoryDriver;
use crate::environment::{EnvironmentError, FnEnvironment};

struct Fixture {
    session: AutomationSession<Arc<MemoryDriver>>,
    driver: Arc<MemoryDriver>,
    registry: Arc<LiveRegistry>,
}

async fn connect() -> Fixture {
    connect_with(Arc::new(MemoryDriver::new())).await
}

async fn connect_with(driver: Arc<MemoryDriver>) -> Fixture {
    connect_configured(driver, SessionConfig::for_tests()).await
}

async fn connect_configured(driver: Arc<MemoryDriver>, config: SessionConfig) -> Fixture {
    let registry = Arc::new(LiveRegistry::new());
    let shared = driver.clone();
    let session = SessionBuilder::new(config)
        .registry(registry.clone())
        .exit_hooks(false)
        .connect(move || Ok(shared))
        .await
        .unwrap();
    Fixture {
        session,
        driver,
        registry,
    }
}

#[derive(Debug)]
enum ChatError {
    Session(SessionError),
    NotFriend(String),
}

impl From<SessionError> for ChatError {
    fn from(e: SessionError) -> Self {
        ChatError::Session(e)
    }
}

const SEND_TEXT: OperationDescriptor = OperationDescriptor::primary("send_text");
const READ_REPLY: OperationDescriptor = OperationDescriptor::sub_surface("read_reply");

#[tokio::test]
async fn test_connect_registers_in_live_registry() {
    let fx = connect().await;

    assert_eq!(fx.session.state(), SessionState::Active);
    assert!(fx.session.is_connected());
    assert_eq!(fx.registry.live_count(), 1);

    fx.session.release().await.unwrap();
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_driver_is_built_on_initialized_worker() {
    let thread_name = Arc::new(Mutex::new(None));
    let seen = thread_name.clone();
    let registry = Arc::new(LiveRegistry::new());

    let session = SessionBuilder::new(SessionConfig::for_tests())
        .registry(registry)
        .connect(move || {
            *seen.lock() = thread::current().name().map(str::to_string);
            Ok(MemoryDriver::new())
        })
        .await
        .unwrap();

    let name = thread_name.lock().clone().unwrap();
    assert!(name.starts_with("surface-worker-"));
    session.release().await;
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let result = SessionBuilder::new(SessionConfig::for_tests())
        .registry(Arc::new(LiveRegistry::new()))
        .connect(|| Err::<MemoryDriver, _>(DriverError::NotConnected))
        .await;

    assert!(matches!(result, Err(SessionError::Connect(_))));
}

#[tokio::test]
async fn test_failed_environment_surfaces_on_connect() {
    let result = SessionBuilder::new(SessionConfig::for_tests())
        .registry(Arc::new(LiveRegistry::new()))
        .environment(FnEnvironment::new("broken", || {
            Err(EnvironmentError("apartment refused".into()))
        }))
        .connect(|| Ok(MemoryDriver::new()))
        .await;

    assert!(matches!(result, Err(SessionError::EnvironmentInit { .. })));
}

#[tokio::test]
async fn test_register_and_release_resource() {
    let fx = connect().await;

    fx.session.register_resource("Alice").await.unwrap();
    assert_eq!(fx.session.registrations(), vec!["Alice".to_string()]);
    assert_eq!(fx.driver.listeners(), vec!["Alice".to_string()]);

    let outcome = fx.session.release_resource("Alice").await.unwrap();
    assert_eq!(outcome, ReleaseOutcome::Released);
    assert!(fx.session.registrations().is_empty());
    assert!(fx.driver.listeners().is_empty());

    fx.session.release().await;
}

#[tokio::test]
async fn test_release_resource_twice() {
    let fx = connect().await;
    fx.session.register_resource("Alice").await.unwrap();

    let first = fx.session.release_resource("Alice").await.unwrap();
    let second = fx.session.release_resource("Alice").await.unwrap();

    assert_eq!(first, ReleaseOutcome::Released);
    assert_eq!(second, ReleaseOutcome::NotRegistered);
    assert_eq!(fx.driver.removals(), vec!["Alice".to_string()]);
    fx.session.release().await;
}

#[tokio::test]
async fn test_register_rejects_empty_id() {
    let fx = connect().await;
    let result = fx.session.register_resource("").await;
    assert!(matches!(result, Err(SessionError::InvalidRoute { .. })));
    fx.session.release().await;
}

#[tokio::test]
async fn test_release_resource_retires_lock() {
    let fx = connect().await;
    fx.session.register_resource("Alice").await.unwrap();
    fx.session
        .run_sub_surface("read_reply", "Alice", |_| ())
        .await
        .unwrap();
    assert_eq!(fx.session.stats().lock_slots, 1);

    fx.session.release_resource("Alice").await.unwrap();

    assert_eq!(fx.session.stats().lock_slots, 0);
    fx.session.release().await;
}

#[tokio::test]
async fn test_unconfirmed_release_is_advisory() {
    let fx = connect().await;
    fx.session.register_resource("Bob").await.unwrap();
    fx.driver.stick("Bob");

    let outcome = fx.session.release_resource("Bob").await.unwrap();

    assert_eq!(outcome, ReleaseOutcome::Unconfirmed);
    assert!(fx.session.registrations().is_empty());
    fx.driver.heal();
    fx.session.release().await;
}

#[tokio::test]
async fn test_failed_release_keeps_registration() {
    let fx = connect().await;
    fx.session.register_resource("Carol").await.unwrap();
    fx.driver.fail_removal_of("Carol");

    let result = fx.session.release_resource("Carol").await;

    assert!(matches!(result, Err(SessionError::Driver(DriverError::Call(_)))));
    assert_eq!(fx.session.registrations(), vec!["Carol".to_string()]);
    fx.driver.heal();
    fx.session.release().await;
}

#[tokio::test]
async fn test_run_primary_on_worker_thread() {
    let fx = connect().await;

    let sent = fx
        .session
        .run_primary("send_text", |driver| driver.simulate("hello", Duration::ZERO))
        .await
        .unwrap();

    assert!(sent);
    assert!(fx.driver.calling_threads()[0].starts_with("surface-worker-"));
    fx.session.release().await;
}

#[tokio::test]
async fn test_collaborator_errors_pass_through() {
    let fx = connect().await;

    let result: Result<(), ChatError> = fx
        .session
        .dispatch(SEND_TEXT, None, |ctx| async move {
            ctx.call(|_| ()).await?;
            Err::<(), _>(ChatError::NotFriend("Dave".to_string()))
        })
        .await;

    match result {
        Err(ChatError::NotFriend(name)) => assert_eq!(name, "Dave"),
        other => panic!("unexpected result: {:?}", other),
    }
    fx.session.release().await;
}

#[tokio::test]
async fn test_sub_surface_context() {
    let fx = connect().await;

    let (kind, id) = fx
        .session
        .dispatch(READ_REPLY, Some("Erin"), |ctx| async move {
            Ok::<_, SessionError>((ctx.kind(), ctx.sub_surface().map(str::to_string)))
        })
        .await
        .unwrap();

    assert_eq!(kind, OperationKind::SubSurface);
    assert_eq!(id.as_deref(), Some("Erin"));
    fx.session.release().await;
}

#[tokio::test]
async fn test_route_validation() {
    let fx = connect().await;

    let missing_id: Result<(), SessionError> = fx
        .session
        .dispatch(READ_REPLY, None, |_| async { Ok(()) })
        .await;
    assert!(matches!(missing_id, Err(SessionError::InvalidRoute { .. })));

    let stray_id: Result<(), SessionError> = fx
        .session
        .dispatch(SEND_TEXT, Some("Alice"), |_| async { Ok(()) })
        .await;
    assert!(matches!(stray_id, Err(SessionError::InvalidRoute { .. })));
    fx.session.release().await;
}

#[tokio::test]
async fn test_classification_is_static() {
    let fx = connect().await;
    fx.session.run_primary("send_text", |_| ()).await.unwrap();

    let result = fx.session.run_sub_surface("send_text", "Alice", |_| ()).await;

    assert!(matches!(
        result,
        Err(SessionError::ClassificationConflict { .. })
    ));
    fx.session.release().await;
}

#[tokio::test]
async fn test_utility_composes_but_cannot_call_driver() {
    let fx = connect().await;

    let direct = fx
        .session
        .run_utility("broadcast", |ctx| async move { ctx.call(|_| ()).await })
        .await;
    assert!(matches!(direct, Err(SessionError::InvalidRoute { .. })));

    let composed = fx
        .session
        .run_utility("broadcast_all", |ctx| async move {
            let session = ctx.compose()?;
            let mut delivered = 0;
            for friend in ["Alice", "Bob"] {
                if session
                    .run_sub_surface("send_reply", friend, |driver| {
                        driver.simulate("hi", Duration::ZERO)
                    })
                    .await?
                {
                    delivered += 1;
                }
            }
            Ok::<_, SessionError>(delivered)
        })
        .await
        .unwrap();
    assert_eq!(composed, 2);

    let nested: Result<(), SessionError> = fx
        .session
        .dispatch(SEND_TEXT, None, |ctx| async move {
            ctx.compose()?;
            Ok::<_, SessionError>(())
        })
        .await;
    assert!(matches!(nested, Err(SessionError::InvalidRoute { .. })));
    fx.session.release().await;
}

#[tokio::test]
async fn test_context_retry_runs_on_workers() {
    let fx = connect().await;
    let attempts = Arc::new(AtomicU32::new(0));

    let counter = attempts.clone();
    let group = fx
        .session
        .dispatch(OperationDescriptor::primary("create_group"), None, move |ctx| async move {
            let policy = ctx.retry_policy();
            let created = ctx
                .retry("create_group", &policy, move |driver| {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    driver.simulate("group", Duration::ZERO);
                    (n >= 2).then(|| format!("group-{}", n))
                })
                .await;
            Ok::<_, SessionError>(created)
        })
        .await
        .unwrap();

    assert_eq!(group.as_deref(), Some("group-2"));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    fx.session.release().await;
}

#[tokio::test]
async fn test_scoped_release_report() {
    let fx = connect().await;
    for id in ["a", "b", "c"] {
        fx.session.register_resource(id).await.unwrap();
    }
    fx.session
        .run_primary("open_chat", |driver| driver.add_listener("untracked"))
        .await
        .unwrap()
        .unwrap();
    fx.driver.fail_removal_of("c");

    let report = fx.session.release().await.unwrap();

    assert_eq!(report.released, vec!["a", "b", "untracked"]);
    assert_eq!(report.failed, vec!["c"]);
    assert!(!report.is_clean());
    assert_eq!(fx.session.state(), SessionState::Released);
    assert!(!fx.session.is_connected());
    assert!(fx.session.registrations().is_empty());
}

#[tokio::test]
async fn test_release_is_idempotent() {
    let fx = connect().await;
    fx.session.register_resource("a").await.unwrap();

    assert!(fx.session.release().await.is_some());
    assert!(fx.session.release().await.is_none());
    assert_eq!(fx.driver.removals(), vec!["a".to_string()]);
}

#[tokio::test]
async fn test_operations_rejected_after_release() {
    let fx = connect().await;
    fx.session.release().await;

    let primary = fx.session.run_primary("send_text", |_| ()).await;
    let sub = fx.session.run_sub_surface("read_reply", "a", |_| ()).await;
    let register = fx.session.register_resource("a").await;
    let release = fx.session.release_resource("a").await.unwrap();

    assert!(matches!(primary, Err(SessionError::ShutDown)));
    assert!(matches!(sub, Err(SessionError::ShutDown)));
    assert!(matches!(register, Err(SessionError::ShutDown)));
    assert_eq!(release, ReleaseOutcome::NotRegistered);
}

#[tokio::test]
async fn test_terminate_gracefully() {
    let fx = connect().await;
    fx.session.register_resource("a").await.unwrap();

    assert!(fx.session.terminate_gracefully().await);
    assert!(!fx.session.terminate_gracefully().await);
}

#[tokio::test]
async fn test_run_scoped_releases_on_exit() {
    let fx = connect().await;
    let handle = fx.session.handle();
    let driver = fx.driver.clone();

    let registered = fx
        .session
        .run_scoped(|session| async move {
            session.register_resource("a").await.unwrap();
            session.register_resource("b").await.unwrap();
            session.registrations().len()
        })
        .await;

    assert_eq!(registered, 2);
    assert_eq!(handle.state(), SessionState::Released);
    assert!(driver.listeners().is_empty());
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_drop_runs_finalizer_release() {
    let fx = connect().await;
    fx.session.register_resource("a").await.unwrap();
    fx.session.register_resource("b").await.unwrap();
    let handle = fx.session.handle();

    drop(fx.session);

    assert_eq!(handle.state(), SessionState::Released);
    assert!(fx.driver.listeners().is_empty());
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_forced_sweep_releases_leaked_session() {
    let fx = connect().await;
    fx.session.register_resource("a").await.unwrap();
    let handle = fx.session.handle();
    std::mem::forget(fx.session);

    assert_eq!(fx.registry.sweep("test"), 1);

    assert_eq!(handle.state(), SessionState::Released);
    assert!(fx.driver.listeners().is_empty());
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_stats_snapshot() {
    let fx = connect().await;
    fx.session.register_resource("a").await.unwrap();
    fx.session.run_sub_surface("read_reply", "a", |_| ()).await.unwrap();

    let stats = fx.session.stats();

    assert_eq!(stats.state, SessionState::Active);
    assert_eq!(stats.registrations, 1);
    assert_eq!(stats.queue_processed, 1);
    assert_eq!(stats.lock_slots, 1);
    assert_eq!(stats.workers, 2);
    assert_eq!(stats.jobs_completed, 3);
    fx.session.release().await;
}

fn paced(pause: Duration) -> SessionConfig {
    SessionConfig {
        release_pause: pause,
        ..SessionConfig::for_tests()
    }
}

#[tokio::test(start_paused = true)]
async fn test_scoped_release_pauses_between_listeners() {
    let fx = connect_configured(Arc::new(MemoryDriver::new()), paced(Duration::from_millis(500))).await;
    for id in ["a", "b", "c"] {
        fx.session.register_resource(id).await.unwrap();
    }

    let started = tokio::time::Instant::now();
    let report = fx.session.release().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.released, vec!["a", "b", "c"]);
    assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(1500), "elapsed {:?}", elapsed);
}

#[tokio::test]
async fn test_finalizer_release_pauses_between_listeners() {
    let fx = connect_configured(Arc::new(MemoryDriver::new()), paced(Duration::from_millis(100))).await;
    for id in ["a", "b", "c"] {
        fx.session.register_resource(id).await.unwrap();
    }

    let started = Instant::now();
    drop(fx.session);
    let elapsed = started.elapsed();

    assert_eq!(fx.driver.removals(), vec!["a", "b", "c"]);
    assert!(elapsed >= Duration::from_millis(200), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(2), "elapsed {:?}", elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_finalizer_waits_for_running_primary_operation() {
    let fx = connect().await;
    fx.session.register_resource("a").await.unwrap();

    let handle = fx.session.handle();
    let running = tokio::spawn(async move {
        handle
            .run_primary("send_text", |driver| {
                let before = driver.removals().len();
                thread::sleep(Duration::from_millis(300));
                driver.removals().len() == before
            })
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    drop(fx.session);

    let untouched = running.await.unwrap().unwrap();
    assert!(untouched, "listener removed while a primary operation was running");
    assert_eq!(fx.driver.removals(), vec!["a"]);
    assert!(fx.registry.is_empty());
}

#[tokio::test]
async fn test_sub_surface_waiter_rejected_once_release_starts() {
    let fx = connect().await;
    let ran_late = Arc::new(AtomicBool::new(false));

    let holder = fx.session.handle();
    let first = tokio::spawn(async move {
        holder
            .run_sub_surface("read_reply", "c", |_| thread::sleep(Duration::from_millis(150)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let waiter = fx.session.handle();
    let flag = ran_late.clone();
    let second = tokio::spawn(async move {
        waiter
            .run_sub_surface("read_reply", "c", move |_| flag.store(true, Ordering::SeqCst))
            .await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let inner = fx.session.handle.inner.clone();
    assert!(inner.begin_release(ReleaseTier::Scoped));

    first.await.unwrap().unwrap();
    assert!(matches!(second.await.unwrap(), Err(SessionError::ShutDown)));
    assert!(!ran_late.load(Ordering::SeqCst));

    inner.pool.shutdown();
    inner.finish_release(ReleaseTier::Scoped);
}
