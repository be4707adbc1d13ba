//! Broadcaster that writes gate messages to the log.
//!
//! The engine has no chat transport of its own. Gate messages are emitted
//! as structured log events so a log shipper or a human can pick them up.

use tally_core::broadcast::{BroadcastError, BroadcastSender};

/// [`BroadcastSender`] that logs every message at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBroadcaster;

impl BroadcastSender for LogBroadcaster {
    async fn send(&self, channel: &str, text: &str) -> Result<(), BroadcastError> {
        tracing::info!(channel, text, "Broadcast");
        Ok(())
    }
}
