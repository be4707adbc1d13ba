//! Stdin intake: JSON lines into the interaction feed.
//!
//! One [`InteractionEvent`](tally_types::InteractionEvent) per line.
//! Blank lines are skipped and malformed lines are logged and dropped.
//!
//! Intake runs on its own OS thread with blocking reads. A blocked read
//! inside the runtime would keep it from shutting down on Ctrl-C.

use std::io::BufRead;
use std::thread;

use tally_core::feed::parse_event_line;
use tally_types::InteractionEvent;
use tokio::sync::{mpsc, oneshot};

/// Summary of one intake run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    /// Lines read, including blank and malformed ones.
    pub lines: u64,
    /// Events handed to the feed.
    pub forwarded: u64,
    /// Lines that could not be decoded.
    pub malformed: u64,
}

/// Read events from `reader` until end of input or until the feed closes.
///
/// Blocks the calling thread; must not run on a runtime worker.
///
/// # Errors
///
/// Returns the underlying I/O error if reading fails.
pub fn read_events<R: BufRead>(
    reader: R,
    events: &mpsc::Sender<InteractionEvent>,
) -> std::io::Result<IntakeStats> {
    let mut stats = IntakeStats::default();

    for line in reader.lines() {
        let line = line?;
        stats.lines = stats.lines.saturating_add(1);
        match parse_event_line(stats.lines, &line) {
            Ok(Some(event)) => {
                if events.blocking_send(event).is_err() {
                    tracing::info!("Feed closed, intake stopping");
                    break;
                }
                stats.forwarded = stats.forwarded.saturating_add(1);
            }
            Ok(None) => {}
            Err(err) => {
                stats.malformed = stats.malformed.saturating_add(1);
                tracing::warn!(error = %err, "Skipping malformed input line");
            }
        }
    }

    tracing::info!(
        lines = stats.lines,
        forwarded = stats.forwarded,
        malformed = stats.malformed,
        "Intake finished"
    );
    Ok(stats)
}

/// Start reading stdin on a detached thread.
///
/// The returned receiver resolves when input ends or fails. The thread is
/// never joined; process exit ends it if stdin is still open.
pub fn spawn_stdin(
    events: mpsc::Sender<InteractionEvent>,
) -> std::io::Result<oneshot::Receiver<std::io::Result<IntakeStats>>> {
    let (done_tx, done_rx) = oneshot::channel();
    thread::Builder::new()
        .name("tally-stdin".to_owned())
        .spawn(move || {
            let result = read_events(std::io::stdin().lock(), &events);
            // The engine may have stopped listening after Ctrl-C.
            let _ = done_tx.send(result);
        })?;
    Ok(done_rx)
}
