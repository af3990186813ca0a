//! Per-worker thread environment.
//!
//! The automation surface is thread-affine: every thread that calls into the
//! driver must first run a one-time setup (a COM apartment on Windows). Each
//! worker runs [`ThreadEnvironment::init_thread`] exactly once before taking
//! its first job.

use thiserror::Error;

/// Thread environment initialization failure.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EnvironmentError(pub String);

/// One-time per-thread setup hook for worker threads.
pub trait ThreadEnvironment: Send + Sync + 'static {
    /// Called once on a freshly spawned worker, before any job.
    fn init_thread(&self) -> Result<(), EnvironmentError>;

    /// Called when the worker exits, only if `init_thread` succeeded.
    fn teardown_thread(&self) {}

    /// Environment name for logs.
    fn name(&self) -> &str {
        "default"
    }
}

/// Environment with no per-thread setup.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEnvironment;

impl ThreadEnvironment for NoopEnvironment {
    fn init_thread(&self) -> Result<(), EnvironmentError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Closure-backed environment.
pub struct FnEnvironment<F> {
    name: String,
    init: F,
}

impl<F> FnEnvironment<F>
where
    F: Fn() -> Result<(), EnvironmentError> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, init: F) -> Self {
        Self {
            name: name.into(),
            init,
        }
    }
}

impl<F> ThreadEnvironment for FnEnvironment<F>
where
    F: Fn() -> Result<(), EnvironmentError> + Send + Sync + 'static,
{
    fn init_thread(&self) -> Result<(), EnvironmentError> {
        (self.init)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Single-threaded COM apartment, required by UI Automation clients.
#[cfg(windows)]
#[derive(Debug, Default, Clone, Copy)]
pub struct ComApartment;

#[cfg(windows)]
impl ThreadEnvironment for ComApartment {
    fn init_thread(&self) -> Result<(), EnvironmentError> {
        use windows_sys::Win32::System::Com::{COINIT_APARTMENTTHREADED, CoInitializeEx};

        // SAFETY: called once on a thread we own, with the reserved pointer null.
        let hr = unsafe { CoInitializeEx(std::ptr::null(), COINIT_APARTMENTTHREADED) };
        // S_FALSE (1) means the apartment already existed on this thread.
        if hr < 0 {
            return Err(EnvironmentError(format!(
                "CoInitializeEx failed with HRESULT 0x{:08X}",
                hr as u32
            )));
        }
        Ok(())
    }

    fn teardown_thread(&self) {
        // SAFETY: balanced with the successful CoInitializeEx in init_thread.
        unsafe { windows_sys::Win32::System::Com::CoUninitialize() };
    }

    fn name(&self) -> &str {
        "com-sta"
    }
}
