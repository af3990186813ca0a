#![allow(dead_code)]

use std::sync::Arc;

use chatpilot_core::{AutomationSession, LiveRegistry, MemoryDriver, SessionBuilder, SessionConfig};

pub struct Harness {
    pub session: AutomationSession<Arc<MemoryDriver>>,
    pub driver: Arc<MemoryDriver>,
    pub registry: Arc<LiveRegistry>,
}

pub async fn connect(workers: usize) -> Harness {
    let driver = Arc::new(MemoryDriver::new());
    let registry = Arc::new(LiveRegistry::new());
    let config = SessionConfig {
        worker_threads: workers,
        ..SessionConfig::for_tests()
    };

    let shared = driver.clone();
    let session = SessionBuilder::new(config)
        .registry(registry.clone())
        .exit_hooks(false)
        .connect(move || Ok(shared))
        .await
        .unwrap();

    Harness {
        session,
        driver,
        registry,
    }
}
