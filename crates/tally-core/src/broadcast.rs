//! Broadcast sender trait and stub implementation.
//!
//! Scheduler gates hand their message to a [`BroadcastSender`] when they
//! fire. The transport behind it (chat API, webhook, log) lives outside
//! this crate; the only contract is that failure is distinguishable from
//! success so the gate knows whether to commit or retry.
//!
//! The [`StubBroadcaster`] records what it was asked to send and can be
//! told to fail a number of times, which is what the gate tests use.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::Mutex;

/// Errors a broadcaster can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// The transport could not deliver the message.
    #[error("broadcast to {channel} failed: {message}")]
    Delivery {
        /// Target channel.
        channel: String,
        /// Description of the failure.
        message: String,
    },
}

/// Outbound message transport used by scheduler gates.
pub trait BroadcastSender: Send + Sync {
    /// Send `text` to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] if the message was not delivered.
    fn send(
        &self,
        channel: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), BroadcastError>> + Send;
}

/// A broadcaster that records messages and fails on demand.
#[derive(Debug, Default)]
pub struct StubBroadcaster {
    /// Every `(channel, text)` pair successfully "sent".
    sent: Mutex<Vec<(String, String)>>,
    /// Number of upcoming sends that will fail.
    failures_remaining: AtomicU32,
    /// Total number of send attempts.
    attempts: AtomicU32,
}

impl StubBroadcaster {
    /// Create a broadcaster that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broadcaster whose next `failures` sends fail.
    pub fn failing(failures: u32) -> Self {
        let stub = Self::default();
        stub.failures_remaining.store(failures, Ordering::Release);
        stub
    }

    /// Make the next `failures` sends fail.
    pub fn fail_next(&self, failures: u32) {
        self.failures_remaining.store(failures, Ordering::Release);
    }

    /// Messages delivered so far.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    /// Number of send attempts, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }
}

impl BroadcastSender for StubBroadcaster {
    async fn send(&self, channel: &str, text: &str) -> Result<(), BroadcastError> {
        self.attempts.fetch_add(1, Ordering::AcqRel);

        let should_fail = self
            .failures_remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(BroadcastError::Delivery {
                channel: channel.to_owned(),
                message: "stub failure".to_owned(),
            });
        }

        self.sent
            .lock()
            .await
            .push((channel.to_owned(), text.to_owned()));
        Ok(())
    }
}
