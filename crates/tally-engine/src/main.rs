//! Engine binary for the tally store.
//!
//! Wires the tracker, the persistent store, the autosave loop and the
//! scheduler gates together, then feeds interaction events read from
//! stdin (one JSON object per line) into the tracker until Ctrl-C or end
//! of input.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `tally-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Open the store and restore the tracker from the last snapshot
//! 4. Spawn the autosave loop, the gate poller and the feed
//! 5. Read stdin until Ctrl-C or end of input
//! 6. Drain the feed, run the final flush and log final statistics

mod broadcaster;
mod error;
mod intake;

use std::path::Path;
use std::sync::Arc;

use tally_core::autosave;
use tally_core::clock::SystemClock;
use tally_core::config::{LoggingConfig, TallyConfig};
use tally_core::feed;
use tally_core::gate::{self, RetryPolicy, SchedulerGate};
use tally_core::shutdown::ShutdownSignal;
use tally_core::tracker::{Tracker, TrackerSettings};
use tally_db::PersistentStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::broadcaster::LogBroadcaster;
use crate::error::EngineError;

/// Configuration file looked up in the working directory.
const CONFIG_PATH: &str = "tally-config.yaml";

/// Capacity of the interaction feed channel.
const FEED_CAPACITY: usize = 1024;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, the store, or the final flush fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("tally-engine starting");
    info!(
        data_dir = %config.storage.data_dir,
        autosave_secs = config.autosave.interval_secs,
        gates = config.gates.schedules.len(),
        "Configuration loaded"
    );

    // 3. Open the store and restore the tracker.
    let store = Arc::new(PersistentStore::open(&config.storage.data_dir).await?);
    let snapshot = store.load_snapshot().await;
    let settings = TrackerSettings::from_config(&config)?;
    let tracker = Tracker::restore(snapshot, settings, Arc::new(SystemClock)).into_shared();

    // 4. Spawn background tasks. Intake stops first so the final flush
    //    sees every event that made it into the feed.
    let intake_stop = Arc::new(ShutdownSignal::new());
    let persist_stop = Arc::new(ShutdownSignal::new());

    let autosave_handle = tokio::spawn(autosave::run_autosave(
        Arc::clone(&tracker),
        Arc::clone(&store),
        config.autosave.interval(),
        Arc::clone(&persist_stop),
    ));

    let policy = RetryPolicy::from_config(&config.gates.retry);
    let gates = config
        .gates
        .schedules
        .iter()
        .cloned()
        .map(|schedule| SchedulerGate::new(schedule, policy))
        .collect();
    let gate_handle = tokio::spawn(gate::run_gate_poller(
        gates,
        Arc::clone(&tracker),
        Arc::new(LogBroadcaster),
        config.gates.poll_interval(),
        Arc::clone(&intake_stop),
    ));

    let (events_tx, events_rx) = tokio::sync::mpsc::channel(FEED_CAPACITY);
    let feed_handle = tokio::spawn(feed::run_feed(
        events_rx,
        Arc::clone(&tracker),
        Arc::clone(&intake_stop),
    ));

    // 5. Read stdin until Ctrl-C or end of input.
    let intake_done = intake::spawn_stdin(events_tx).map_err(EngineError::from)?;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|source| EngineError::Signal { source })?;
            info!("Ctrl-C received, shutting down");
        }
        result = intake_done => {
            match result {
                Ok(Ok(stats)) => info!(forwarded = stats.forwarded, "End of input, shutting down"),
                Ok(Err(err)) => tracing::warn!(error = %err, "Stdin read failed, shutting down"),
                Err(_) => tracing::warn!("Intake thread exited without a result, shutting down"),
            }
        }
    }

    // 6. Drain, flush and report.
    intake_stop.request_stop();
    let applied = feed_handle.await.map_err(EngineError::from)?;
    gate_handle.await.map_err(EngineError::from)?;

    persist_stop.request_stop();
    let outcome = autosave_handle
        .await
        .map_err(EngineError::from)?
        .map_err(EngineError::from)?;

    let stats = tracker.lock().await.render_stats();
    info!(
        applied,
        ?outcome,
        days_running = stats.days_running,
        total_users = stats.total_users,
        active_today = stats.active_today,
        active_this_week = stats.active_this_week,
        total_messages = stats.total_messages,
        new_members = stats.new_members,
        "tally-engine shutdown complete"
    );

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load configuration from `tally-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
/// A missing file yields defaults with environment overrides applied.
fn load_config() -> Result<TallyConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(TallyConfig::from_file(config_path)?)
    } else {
        Ok(TallyConfig::parse("")?)
    }
}
