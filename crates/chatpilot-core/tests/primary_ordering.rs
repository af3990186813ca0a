//! FIFO ordering of primary-surface operations under concurrent callers.

mod common;

use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;
use tokio::sync::Mutex as AsyncMutex;

use chatpilot_core::{MemoryDriver, SessionError, SessionHandle};

/// Submit one primary operation under the submission gate so the ticket
/// and the queue position are taken together.
async fn submit(
    handle: SessionHandle<Arc<MemoryDriver>>,
    gate: Arc<AsyncMutex<u32>>,
    executed: Arc<Mutex<Vec<u32>>>,
    work: Duration,
) -> Result<u32, SessionError> {
    let mut next = gate.lock().await;
    let ticket = *next;
    *next += 1;

    let mut call = Box::pin(handle.run_primary("record", move |driver| {
        driver.simulate("record", work);
        executed.lock().push(ticket);
    }));
    let first = futures::poll!(call.as_mut());
    drop(next);

    match first {
        Poll::Ready(result) => result.map(|()| ticket),
        Poll::Pending => call.await.map(|()| ticket),
    }
}

fn check_fifo(delays: Vec<(u64, u64)>) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let harness = common::connect(3).await;
        let gate = Arc::new(AsyncMutex::new(0u32));
        let executed = Arc::new(Mutex::new(Vec::new()));

        let mut callers = Vec::new();
        for (submit_delay, work) in delays.iter().copied() {
            let handle = harness.session.handle();
            let gate = gate.clone();
            let executed = executed.clone();
            callers.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_micros(submit_delay)).await;
                submit(handle, gate, executed, Duration::from_micros(work)).await
            }));
        }
        for caller in callers {
            caller.await.unwrap().unwrap();
        }

        let order = executed.lock().clone();
        let expected: Vec<u32> = (0..delays.len() as u32).collect();
        assert_eq!(order, expected);

        harness.session.release().await;
    });
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn execution_order_matches_submission_order(
        delays in prop::collection::vec((0u64..2_000, 0u64..500), 1..24)
    ) {
        check_fifo(delays);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_callers_complete_in_submission_order() {
    let harness = common::connect(3).await;
    let completed = Arc::new(Mutex::new(Vec::new()));

    let mut callers = Vec::new();
    for (name, offset, work) in [("A", 0u64, 60u64), ("B", 10, 20), ("C", 20, 0)] {
        let handle = harness.session.handle();
        let completed = completed.clone();
        callers.push(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(offset)).await;
            handle
                .run_primary("send_text", move |driver| {
                    driver.simulate(name, Duration::from_millis(work));
                    completed.lock().push(name);
                })
                .await
        }));
    }
    for caller in callers {
        caller.await.unwrap().unwrap();
    }

    assert_eq!(*completed.lock(), vec!["A", "B", "C"]);
    harness.session.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_operation_does_not_block_queue() {
    let harness = common::connect(2).await;
    let handle = harness.session.handle();

    let failing = handle.run_primary("explode", |_| -> () { panic!("dialog closed") });
    let next = handle.run_primary("send_text", |driver| driver.simulate("after", Duration::ZERO));
    let (failing, next) = tokio::join!(failing, next);

    assert!(matches!(failing, Err(SessionError::Panicked(_))));
    assert!(next.unwrap());
    harness.session.release().await;
}
