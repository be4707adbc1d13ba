//! Integration tests for tracker persistence.
//!
//! Each test opens a store in a temporary directory, drives a tracker
//! through the public API, and reloads the state through a fresh store
//! instance the way the engine does on restart.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tally_core::autosave::{FlushOutcome, flush};
use tally_core::broadcast::StubBroadcaster;
use tally_core::clock::ManualClock;
use tally_core::config::GateConfig;
use tally_core::gate::{FireOutcome, RetryPolicy, SchedulerGate};
use tally_core::tracker::{SharedTracker, Tracker, TrackerSettings};
use tally_db::PersistentStore;
use tally_types::UserId;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 20, 18, 30, 0).unwrap()
}

async fn reopen(dir: &std::path::Path, clock: Arc<ManualClock>) -> SharedTracker {
    let store = PersistentStore::open(dir).await.expect("reopen store");
    let snapshot = store.load_snapshot().await;
    Tracker::restore(snapshot, TrackerSettings::default(), clock).into_shared()
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let store = PersistentStore::open(dir.path()).await.unwrap();
    let tracker = Tracker::new(TrackerSettings::default(), clock.clone()).into_shared();

    {
        let mut guard = tracker.lock().await;
        for _ in 0..25 {
            guard
                .record_interaction(UserId::new(10), Some("Narek"), Some("@narek"))
                .unwrap();
        }
        guard.record_command(UserId::new(11)).unwrap();
        guard
            .record_new_member(UserId::new(12), Some("Sona"), None)
            .unwrap();
    }
    flush(&tracker, &store, false).await.unwrap();
    let before = tracker.lock().await.snapshot();

    clock.advance(TimeDelta::days(2));
    let restored = reopen(dir.path(), clock).await;
    let mut guard = restored.lock().await;

    assert_eq!(guard.snapshot(), before);
    assert!(!guard.is_dirty());

    let narek = guard.get_user(UserId::new(10));
    assert_eq!(narek.message_count, 25);
    assert_eq!(narek.points, 2);
    assert_eq!(narek.handle.as_deref(), Some("@narek"));

    let stats = guard.render_stats();
    assert_eq!(stats.days_running, 2);
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.total_messages, 25);
    assert_eq!(stats.new_members, 1);
    assert_eq!(stats.active_today, 0);
    assert_eq!(stats.active_this_week, 3);
}

#[tokio::test]
async fn crash_before_flush_loses_only_unflushed_changes() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let store = PersistentStore::open(dir.path()).await.unwrap();
    let tracker = Tracker::new(TrackerSettings::default(), clock.clone()).into_shared();

    tracker
        .lock()
        .await
        .record_interaction(UserId::new(1), None, None)
        .unwrap();
    flush(&tracker, &store, false).await.unwrap();
    let flushed = tracker.lock().await.snapshot();

    // Mutate without flushing, then "crash" by dropping everything.
    {
        let mut guard = tracker.lock().await;
        guard.record_interaction(UserId::new(1), None, None).unwrap();
        guard.record_command(UserId::new(2)).unwrap();
        assert!(guard.is_dirty());
    }
    drop(tracker);
    drop(store);

    let restored = reopen(dir.path(), clock).await;
    assert_eq!(restored.lock().await.snapshot(), flushed);
}

#[tokio::test]
async fn gate_firing_is_durable_after_flush() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let store = PersistentStore::open(dir.path()).await.unwrap();
    let tracker = Tracker::new(TrackerSettings::default(), clock.clone()).into_shared();
    let sender = StubBroadcaster::new();
    let schedule = GateConfig {
        name: "weekly".to_owned(),
        interval_days: 7,
        channel: "general".to_owned(),
        message: "Top of the week".to_owned(),
    };

    let mut gate = SchedulerGate::new(schedule.clone(), RetryPolicy::default());
    assert_eq!(gate.poll(&tracker, &sender).await, FireOutcome::Fired);
    let outcome = flush(&tracker, &store, false).await.unwrap();
    assert!(matches!(outcome, FlushOutcome::Written { .. }));

    clock.advance(TimeDelta::days(3));
    let restored = reopen(dir.path(), clock.clone()).await;
    let mut gate = SchedulerGate::new(schedule, RetryPolicy::default());
    assert_eq!(gate.poll(&restored, &sender).await, FireOutcome::NotDue);

    clock.advance(TimeDelta::days(4) + TimeDelta::hours(1));
    assert_eq!(gate.poll(&restored, &sender).await, FireOutcome::Fired);
    assert_eq!(sender.attempts(), 2);
}

#[tokio::test]
async fn unflushed_gate_firing_repeats_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(start()));
    let store = PersistentStore::open(dir.path()).await.unwrap();
    let tracker = Tracker::new(TrackerSettings::default(), clock.clone()).into_shared();
    flush(&tracker, &store, false).await.unwrap();

    let sender = StubBroadcaster::new();
    let schedule = GateConfig {
        name: "daily".to_owned(),
        interval_days: 1,
        channel: "general".to_owned(),
        message: "Daily stats".to_owned(),
    };
    let mut gate = SchedulerGate::new(schedule.clone(), RetryPolicy::default());
    assert_eq!(gate.poll(&tracker, &sender).await, FireOutcome::Fired);
    drop(tracker);

    let restored = reopen(dir.path(), clock).await;
    let mut gate = SchedulerGate::new(schedule, RetryPolicy::default());
    assert_eq!(gate.poll(&restored, &sender).await, FireOutcome::Fired);
    assert_eq!(sender.attempts(), 2);
}
