//! Cooperative shutdown signal shared by the background loops.
//!
//! The engine requests a stop once (Ctrl-C or end of input); every loop
//! observes it, finishes its current step and returns. The autosave loop
//! performs its final flush after observing the signal.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Shared stop flag with async notification.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,
    /// Wakes every task waiting in [`stopped`](Self::stopped).
    notify: Notify,
}

impl ShutdownSignal {
    /// Create a signal in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake every waiter.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Wait until a stop is requested.
    ///
    /// Returns immediately if one already was.
    pub async fn stopped(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}
