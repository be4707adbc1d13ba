//! Periodic, dirty-gated persistence of the tracker.
//!
//! [`flush`] copies the tracker state under its lock, releases the lock,
//! and writes both documents inside the store's exclusive write section.
//! The revision captured with the copy is what gets marked persisted, so
//! mutations that land during the write keep the tracker dirty.
//!
//! Lock order is always store section first, tracker second. Nothing that
//! holds the tracker lock ever waits on the store.

use std::sync::Arc;
use std::time::Duration;

use tally_db::{DbError, PersistentStore};
use tokio::time::MissedTickBehavior;

use crate::shutdown::ShutdownSignal;
use crate::tracker::SharedTracker;

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing changed since the last write; no I/O happened.
    Clean,
    /// Both documents were written.
    Written {
        /// Revision now on disk.
        revision: u64,
        /// Number of user records written.
        users: usize,
    },
}

/// Write the tracker to disk if it is dirty, or unconditionally if `force`.
///
/// # Errors
///
/// Returns [`DbError`] if either document could not be written. The
/// tracker stays dirty and the next flush retries.
pub async fn flush(
    tracker: &SharedTracker,
    store: &PersistentStore,
    force: bool,
) -> Result<FlushOutcome, DbError> {
    let section = store.exclusive().await;

    let (snapshot, revision) = {
        let guard = tracker.lock().await;
        if !force && !guard.is_dirty() {
            return Ok(FlushOutcome::Clean);
        }
        (guard.snapshot(), guard.revision())
    };

    section.write_snapshot(&snapshot).await?;
    tracker.lock().await.mark_persisted(revision);

    let users = snapshot.users.len();
    tracing::debug!(revision, users, force, "Flushed tracker");
    Ok(FlushOutcome::Written { revision, users })
}

/// Flush on a fixed period until shutdown, then flush one final time.
///
/// Failed periodic writes are logged and retried on the next tick. The
/// result of the final flush is returned to the caller.
///
/// # Errors
///
/// Returns [`DbError`] if the final flush failed.
pub async fn run_autosave(
    tracker: SharedTracker,
    store: Arc<PersistentStore>,
    period: Duration,
    shutdown: Arc<ShutdownSignal>,
) -> Result<FlushOutcome, DbError> {
    tracing::info!(
        period_secs = period.as_secs(),
        data_dir = %store.root().display(),
        "Autosave loop started"
    );

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.stopped() => break,
            _ = ticker.tick() => {}
        }
        match flush(&tracker, &store, false).await {
            Ok(FlushOutcome::Written { revision, users }) => {
                tracing::info!(revision, users, "Autosaved");
            }
            Ok(FlushOutcome::Clean) => {}
            Err(err) => {
                tracing::error!(error = %err, "Autosave failed, state stays dirty");
            }
        }
    }

    let outcome = flush(&tracker, &store, false).await;
    match &outcome {
        Ok(outcome) => tracing::info!(?outcome, "Final flush complete"),
        Err(err) => tracing::error!(error = %err, "Final flush failed"),
    }
    outcome
}
