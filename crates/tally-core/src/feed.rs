//! Interaction feed: the path by which chat events reach the tracker.
//!
//! Events arrive on a `tokio::sync::mpsc` channel. The engine fills it from
//! JSON lines on stdin via [`parse_event_line`]; a chat adapter would fill
//! it from its own API. [`run_feed`] applies every event until the channel
//! closes or a stop is requested, then drains whatever is already buffered.

use std::sync::Arc;

use tally_ledger::LedgerError;
use tally_types::InteractionEvent;
use tokio::sync::mpsc;

use crate::shutdown::ShutdownSignal;
use crate::tracker::SharedTracker;

/// Errors raised by the interaction feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// A line could not be decoded into an [`InteractionEvent`].
    #[error("malformed event on line {line}: {source}")]
    Decode {
        /// 1-based input line number.
        line: u64,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The tracker rejected the event.
    #[error("event rejected: {0}")]
    Rejected(#[from] LedgerError),
}

/// Decode one JSON line into an event.
///
/// Returns `Ok(None)` for blank lines.
///
/// # Errors
///
/// Returns [`FeedError::Decode`] if the line is not a valid event.
pub fn parse_event_line(line_number: u64, line: &str) -> Result<Option<InteractionEvent>, FeedError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|source| FeedError::Decode {
            line: line_number,
            source,
        })
}

/// Apply events from `events` to the tracker.
///
/// Returns the number of events applied. Rejected events are logged and
/// skipped.
pub async fn run_feed(
    mut events: mpsc::Receiver<InteractionEvent>,
    tracker: SharedTracker,
    shutdown: Arc<ShutdownSignal>,
) -> u64 {
    let mut applied: u64 = 0;

    loop {
        let event = tokio::select! {
            () = shutdown.stopped() => break,
            event = events.recv() => event,
        };
        let Some(event) = event else {
            tracing::info!("Interaction feed closed");
            return applied;
        };
        if apply_one(&tracker, &event).await {
            applied = applied.saturating_add(1);
        }
    }

    // Stop requested: take what is already queued, then refuse the rest.
    events.close();
    while let Some(event) = events.recv().await {
        if apply_one(&tracker, &event).await {
            applied = applied.saturating_add(1);
        }
    }
    tracing::info!(applied, "Interaction feed stopped");
    applied
}

async fn apply_one(tracker: &SharedTracker, event: &InteractionEvent) -> bool {
    let result = tracker.lock().await.apply(event);
    match result.map_err(FeedError::from) {
        Ok(recorded) => {
            tracing::trace!(
                user_id = %event.user_id,
                kind = ?event.kind,
                created = recorded.user_created,
                points = recorded.points_awarded,
                "Applied interaction"
            );
            true
        }
        Err(err) => {
            tracing::warn!(user_id = %event.user_id, error = %err, "Dropped interaction");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tally_types::{InteractionKind, UserId};

    use super::*;
    use crate::clock::ManualClock;
    use crate::tracker::{Tracker, TrackerSettings};

    fn tracker() -> SharedTracker {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 9, 1, 0, 0, 0).unwrap(),
        ));
        Tracker::new(TrackerSettings::default(), clock).into_shared()
    }

    fn message(id: i64) -> InteractionEvent {
        InteractionEvent {
            user_id: UserId::new(id),
            display_name: None,
            handle: None,
            kind: InteractionKind::Message,
        }
    }

    #[test]
    fn parses_event_lines() {
        let event = parse_event_line(
            1,
            r#"{"user_id": 42, "display_name": "Lilit", "handle": "@lilit", "kind": "command"}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.user_id, UserId::new(42));
        assert_eq!(event.kind, InteractionKind::Command);

        assert!(parse_event_line(2, "   ").unwrap().is_none());

        let err = parse_event_line(3, r#"{"user_id": "x"}"#).unwrap_err();
        assert!(matches!(err, FeedError::Decode { line: 3, .. }));
    }

    #[tokio::test]
    async fn applies_until_channel_closes() {
        let tracker = tracker();
        let (tx, rx) = mpsc::channel(8);
        for id in [1, 2, 1] {
            tx.send(message(id)).await.unwrap();
        }
        drop(tx);

        let applied = run_feed(rx, tracker.clone(), Arc::new(ShutdownSignal::new())).await;
        assert_eq!(applied, 3);

        let mut guard = tracker.lock().await;
        assert_eq!(guard.get_user(UserId::new(1)).message_count, 2);
        assert_eq!(guard.ledger().global().total_messages, 3);
    }

    #[tokio::test]
    async fn drains_buffer_after_stop() {
        let tracker = tracker();
        let shutdown = Arc::new(ShutdownSignal::new());
        let (tx, rx) = mpsc::channel(8);
        tx.send(message(7)).await.unwrap();
        tx.send(message(8)).await.unwrap();
        shutdown.request_stop();

        let applied = run_feed(rx, tracker.clone(), shutdown).await;
        assert_eq!(applied, 2);
        assert!(tx.send(message(9)).await.is_err());
        assert_eq!(tracker.lock().await.ledger().len(), 2);
    }
}
