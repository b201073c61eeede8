use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use tracing::info;

/// Stop flag set from the Ctrl+C handler.
///
/// [`ShutdownSignal::wait`] sleeps like `thread::sleep` but returns as soon
/// as the signal fires.
pub struct ShutdownSignal {
    stopped: AtomicBool,
    wake: Condvar,
    lock: Mutex<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            stopped: AtomicBool::new(false),
            wake: Condvar::new(),
            lock: Mutex::new(()),
        }
    }

    /// Create a signal that Ctrl+C triggers
    pub fn install() -> Result<Arc<Self>> {
        let signal = Arc::new(Self::new());
        let handler = Arc::clone(&signal);
        ctrlc::set_handler(move || {
            info!("Interrupted, stopping...");
            handler.trigger();
        })?;
        Ok(signal)
    }

    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless triggered first.
    ///
    /// Returns `true` if the signal fired.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }

        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, timeout) = self
            .wake
            .wait_timeout_while(guard, duration, |_| !self.is_shutdown())
            .unwrap_or_else(PoisonError::into_inner);
        drop(guard);
        !timeout.timed_out()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
