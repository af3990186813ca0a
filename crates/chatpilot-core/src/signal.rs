//! Process exit and termination signal hooks for the forced sweep.

use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::error::SessionError;
use crate::lifecycle::LiveRegistry;

static EXIT_HOOK: AtomicBool = AtomicBool::new(false);
static SIGNAL_HOOK: AtomicBool = AtomicBool::new(false);

/// Name of the thread that waits for termination signals.
pub const SIGNAL_THREAD_NAME: &str = "chatpilot-signals";

/// Install the exit hook and signal handlers once per process.
pub fn install_process_hooks() -> Result<(), SessionError> {
    install_exit_hook()?;
    install_signal_handlers()
}

/// Whether the exit hook has been registered.
pub fn exit_hook_installed() -> bool {
    EXIT_HOOK.load(Ordering::SeqCst)
}

/// Whether the signal listener has been started.
pub fn signal_handlers_installed() -> bool {
    SIGNAL_HOOK.load(Ordering::SeqCst)
}

/// Register a C `atexit` callback that sweeps the global registry.
///
/// Returns `Ok(false)` if it was already registered.
pub fn install_exit_hook() -> Result<bool, SessionError> {
    if EXIT_HOOK.swap(true, Ordering::SeqCst) {
        return Ok(false);
    }

    // SAFETY: `sweep_on_exit` is a plain `extern "C"` function that never
    // unwinds across the FFI boundary.
    let rc = unsafe { libc::atexit(sweep_on_exit) };
    if rc != 0 {
        EXIT_HOOK.store(false, Ordering::SeqCst);
        return Err(SessionError::HookSetup(format!("atexit returned {}", rc)));
    }

    debug!("Process exit hook installed");
    Ok(true)
}

extern "C" fn sweep_on_exit() {
    let _ = panic::catch_unwind(|| {
        LiveRegistry::global().sweep("process exit");
    });
}

/// Sweep the global registry on SIGTERM/SIGINT, then exit with status 0.
///
/// The listener runs on its own thread with its own runtime, so it keeps
/// working after the runtime of the caller that installed it shuts down.
#[cfg(unix)]
pub fn install_signal_handlers() -> Result<(), SessionError> {
    use std::sync::mpsc;
    use std::thread;

    if SIGNAL_HOOK.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let (ready_tx, ready_rx) = mpsc::channel();
    let spawned = thread::Builder::new()
        .name(SIGNAL_THREAD_NAME.to_string())
        .spawn(move || listen_for_signals(ready_tx));
    if let Err(e) = spawned {
        SIGNAL_HOOK.store(false, Ordering::SeqCst);
        return Err(SessionError::HookSetup(e.to_string()));
    }

    let ready = ready_rx
        .recv()
        .unwrap_or_else(|_| Err("signal thread exited during setup".to_string()));
    if let Err(message) = ready {
        SIGNAL_HOOK.store(false, Ordering::SeqCst);
        return Err(SessionError::HookSetup(message));
    }

    info!("Signal handlers installed (SIGTERM, SIGINT)");
    Ok(())
}

#[cfg(unix)]
fn listen_for_signals(ready: std::sync::mpsc::Sender<Result<(), String>>) {
    use tokio::signal::unix::{SignalKind, signal};

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };

    runtime.block_on(async move {
        let registered = signal(SignalKind::terminate())
            .and_then(|term| signal(SignalKind::interrupt()).map(|int| (term, int)));
        let (mut sigterm, mut sigint) = match registered {
            Ok(pair) => {
                let _ = ready.send(Ok(()));
                pair
            }
            Err(e) => {
                let _ = ready.send(Err(e.to_string()));
                return;
            }
        };

        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received {}, releasing live sessions", name);

        // Nothing else runs on this thread, so the blocking sweep is safe.
        LiveRegistry::global().sweep(name);
        std::process::exit(0);
    });
}

/// Only the exit hook is used on this platform.
#[cfg(not(unix))]
pub fn install_signal_handlers() -> Result<(), SessionError> {
    if !SIGNAL_HOOK.swap(true, Ordering::SeqCst) {
        debug!("Signal sweep not installed on this platform; relying on exit hook");
    }
    Ok(())
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
