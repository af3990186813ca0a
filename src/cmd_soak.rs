//! Soak subcommand: exercise a session over the in-memory driver.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use chatpilot_config::Config;
use chatpilot_core::{AutomationSession, MemoryDriver, SessionConfig, SurfaceDriver};

/// Register conversations, run mixed primary and sub-surface traffic
/// concurrently, then release and print a JSON summary.
pub(crate) async fn run_soak(
    config: &Config,
    conversations: usize,
    rounds: usize,
    latency_ms: u64,
    release_pause_ms: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session_config = SessionConfig::from(config);
    if let Some(pause) = release_pause_ms {
        session_config.release_pause = Duration::from_millis(pause);
    }

    let latency = Duration::from_millis(latency_ms);
    let session =
        AutomationSession::connect(session_config, move || Ok(MemoryDriver::with_latency(latency)))
            .await?;

    let ids: Vec<String> = (0..conversations)
        .map(|i| format!("conversation-{}", i))
        .collect();
    for id in &ids {
        session.register_resource(id).await?;
    }
    info!("Soak: {} conversations registered", ids.len());

    let started = Instant::now();
    let mut tasks = Vec::with_capacity(conversations * rounds);
    for _ in 0..rounds {
        for id in &ids {
            let handle = session.handle();
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                handle
                    .run_sub_surface("read_reply", &id, move |driver| {
                        driver.simulate("read_reply", latency)
                    })
                    .await?;
                handle
                    .run_primary("send_text", move |driver| {
                        driver.simulate("send_text", latency)
                    })
                    .await
            }));
        }
    }

    let mut failures = 0usize;
    for task in futures::future::join_all(tasks).await {
        match task {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!("Soak operation failed: {}", e);
                failures += 1;
            }
            Err(e) => {
                warn!("Soak task failed: {}", e);
                failures += 1;
            }
        }
    }
    let elapsed = started.elapsed();

    let listeners = session
        .run_primary("list_listeners", |driver| driver.listeners().len())
        .await?;
    let stats = session.stats();
    let report = session.release().await;

    let summary = serde_json::json!({
        "conversations": conversations,
        "rounds": rounds,
        "elapsed_ms": elapsed.as_millis() as u64,
        "failures": failures,
        "listeners_before_release": listeners,
        "stats": stats,
        "release": report,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
