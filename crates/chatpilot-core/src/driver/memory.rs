//! In-memory driver used by tests and the soak command.

use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::{DriverError, SurfaceDriver};

#[derive(Default)]
struct MemoryState {
    listeners: Vec<String>,
    failing: HashSet<String>,
    sticky: HashSet<String>,
    threads: Vec<String>,
    removals: Vec<String>,
}

/// In-memory stand-in for a chat client's automation surface.
#[derive(Default)]
pub struct MemoryDriver {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` inside every listener call.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            latency,
        }
    }

    /// Make `remove_listener(id)` fail.
    pub fn fail_removal_of(&self, id: &str) {
        self.state.lock().failing.insert(id.to_string());
    }

    /// Make `remove_listener(id)` report success but keep the listener.
    pub fn stick(&self, id: &str) {
        self.state.lock().sticky.insert(id.to_string());
    }

    /// Clear injected failures.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing.clear();
        state.sticky.clear();
    }

    /// Names of the threads that performed listener calls, in call order.
    pub fn calling_threads(&self) -> Vec<String> {
        self.state.lock().threads.clone()
    }

    /// Every successful `remove_listener` call, in order.
    pub fn removals(&self) -> Vec<String> {
        self.state.lock().removals.clone()
    }

    /// Run a simulated blocking action, e.g. sending a message.
    pub fn simulate(&self, label: &str, duration: Duration) -> bool {
        self.note_thread();
        thread::sleep(duration);
        !label.is_empty()
    }

    fn note_thread(&self) {
        let name = thread::current()
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| "<unnamed>".to_string());
        self.state.lock().threads.push(name);
    }

    fn pause(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }
}

impl SurfaceDriver for MemoryDriver {
    fn add_listener(&self, id: &str) -> Result<(), DriverError> {
        self.note_thread();
        self.pause();
        let mut state = self.state.lock();
        if !state.listeners.iter().any(|l| l == id) {
            state.listeners.push(id.to_string());
        }
        Ok(())
    }

    fn remove_listener(&self, id: &str) -> Result<(), DriverError> {
        self.note_thread();
        self.pause();
        let mut state = self.state.lock();
        if state.failing.contains(id) {
            return Err(DriverError::Call(format!("window for '{}' did not respond", id)));
        }
        if state.sticky.contains(id) {
            return Ok(());
        }
        let before = state.listeners.len();
        state.listeners.retain(|l| l != id);
        if state.listeners.len() == before {
            return Err(DriverError::ListenerNotFound(id.to_string()));
        }
        state.removals.push(id.to_string());
        Ok(())
    }

    fn listeners(&self) -> Vec<String> {
        self.state.lock().listeners.clone()
    }
}
