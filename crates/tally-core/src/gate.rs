//! Durable day-interval triggers for recurring broadcasts.
//!
//! A [`SchedulerGate`] is due when it has never fired, or when at least
//! `interval_days` whole days have elapsed since it last fired. The
//! last-fired timestamp lives in the global document, so it survives
//! restarts through the normal autosave path. A firing whose commit was
//! not flushed before a crash fires again after restart (at-least-once).
//!
//! A failed broadcast leaves the gate due. Retries are spaced by an
//! exponential backoff capped at `max_backoff_secs`, and once the number
//! of consecutive failures reaches `alert_after_failures` every further
//! failure is logged at error level.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::MissedTickBehavior;

use crate::broadcast::{BroadcastError, BroadcastSender};
use crate::clock::elapsed_whole_days;
use crate::config::{GateConfig, RetryConfig};
use crate::shutdown::ShutdownSignal;
use crate::tracker::SharedTracker;

/// Errors raised while firing a gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// The broadcaster rejected the message; the gate stays due.
    #[error("gate {gate} could not broadcast: {source}")]
    Broadcast {
        /// Gate name.
        gate: String,
        /// Underlying broadcaster error.
        source: BroadcastError,
    },
}

/// Backoff and alerting policy shared by all gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base: TimeDelta,
    /// Upper bound on any delay.
    pub max: TimeDelta,
    /// Consecutive failures at which alerting starts.
    pub alert_after: u32,
}

impl RetryPolicy {
    /// Build the policy from its configuration section.
    pub fn from_config(config: &RetryConfig) -> Self {
        let base = TimeDelta::seconds(i64::from(config.base_backoff_secs));
        let max = TimeDelta::seconds(i64::from(config.max_backoff_secs)).max(base);
        Self {
            base,
            max,
            alert_after: config.alert_after_failures.max(1),
        }
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    ///
    /// The first failure waits `base`, each further failure doubles it, and
    /// the result never exceeds `max`.
    pub fn backoff(&self, failures: u32) -> TimeDelta {
        let exponent = failures.saturating_sub(1).min(30);
        2_i32
            .checked_pow(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Whether `failures` consecutive failures warrant an alert.
    pub const fn should_alert(&self, failures: u32) -> bool {
        failures >= self.alert_after
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Result of one [`SchedulerGate::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    /// The interval has not elapsed yet.
    NotDue,
    /// The gate is due but still waiting out a failure backoff.
    BackingOff {
        /// Earliest next attempt.
        until: DateTime<Utc>,
    },
    /// The broadcast succeeded and the firing was committed.
    Fired,
    /// The broadcast failed; the gate stays due.
    Failed {
        /// Failures in a row, including this one.
        consecutive_failures: u32,
        /// Earliest next attempt.
        retry_at: DateTime<Utc>,
    },
}

/// One named recurring broadcast.
#[derive(Debug, Clone)]
pub struct SchedulerGate {
    /// What to send, where, and how often.
    schedule: GateConfig,
    /// Backoff and alerting policy.
    policy: RetryPolicy,
    /// Failures since the last success.
    consecutive_failures: u32,
    /// No attempt before this instant.
    retry_at: Option<DateTime<Utc>>,
}

impl SchedulerGate {
    /// Create a gate from its schedule.
    pub const fn new(schedule: GateConfig, policy: RetryPolicy) -> Self {
        Self {
            schedule,
            policy,
            consecutive_failures: 0,
            retry_at: None,
        }
    }

    /// Gate name; also the key of its persisted timestamp.
    pub fn name(&self) -> &str {
        &self.schedule.name
    }

    /// Failures since the last successful firing.
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the gate should fire at `now` given when it last fired.
    pub fn is_due(&self, last_fired: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_fired.is_none_or(|fired| {
            elapsed_whole_days(fired, now) >= i64::from(self.schedule.interval_days)
        })
    }

    /// Send the gate's message and commit the firing on success.
    ///
    /// Does not check whether the gate is due. The tracker lock is only
    /// taken after the broadcast returns.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Broadcast`] if the broadcaster failed; nothing
    /// is committed in that case.
    pub async fn fire<S: BroadcastSender>(
        &mut self,
        tracker: &SharedTracker,
        sender: &S,
    ) -> Result<DateTime<Utc>, GateError> {
        sender
            .send(&self.schedule.channel, &self.schedule.message)
            .await
            .map_err(|source| GateError::Broadcast {
                gate: self.schedule.name.clone(),
                source,
            })?;

        let fired_at = {
            let mut guard = tracker.lock().await;
            let now = guard.now();
            guard.record_gate_fired(&self.schedule.name, now);
            now
        };
        self.consecutive_failures = 0;
        self.retry_at = None;

        tracing::info!(
            gate = %self.schedule.name,
            channel = %self.schedule.channel,
            fired_at = %fired_at,
            "Gate fired"
        );
        Ok(fired_at)
    }

    /// Fire the gate if it is due and not backing off.
    pub async fn poll<S: BroadcastSender>(
        &mut self,
        tracker: &SharedTracker,
        sender: &S,
    ) -> FireOutcome {
        let (now, last_fired) = {
            let guard = tracker.lock().await;
            (guard.now(), guard.gate_last_fired(&self.schedule.name))
        };

        if !self.is_due(last_fired, now) {
            return FireOutcome::NotDue;
        }
        if let Some(until) = self.retry_at.filter(|until| now < *until) {
            return FireOutcome::BackingOff { until };
        }

        match self.fire(tracker, sender).await {
            Ok(_) => FireOutcome::Fired,
            Err(err) => self.record_failure(&err, now),
        }
    }

    fn record_failure(&mut self, err: &GateError, now: DateTime<Utc>) -> FireOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = self.policy.backoff(self.consecutive_failures);
        let retry_at = now.checked_add_signed(delay).unwrap_or(now);
        self.retry_at = Some(retry_at);

        if self.policy.should_alert(self.consecutive_failures) {
            tracing::error!(
                gate = %self.schedule.name,
                consecutive_failures = self.consecutive_failures,
                retry_at = %retry_at,
                error = %err,
                "Gate broadcast keeps failing"
            );
        } else {
            tracing::warn!(
                gate = %self.schedule.name,
                consecutive_failures = self.consecutive_failures,
                retry_at = %retry_at,
                error = %err,
                "Gate broadcast failed, will retry"
            );
        }

        FireOutcome::Failed {
            consecutive_failures: self.consecutive_failures,
            retry_at,
        }
    }
}

/// Poll every gate on a fixed period until shutdown is requested.
pub async fn run_gate_poller<S: BroadcastSender>(
    mut gates: Vec<SchedulerGate>,
    tracker: SharedTracker,
    sender: Arc<S>,
    period: Duration,
    shutdown: Arc<ShutdownSignal>,
) {
    if gates.is_empty() {
        tracing::info!("No gates configured, poller idle");
        return;
    }
    tracing::info!(gates = gates.len(), period_secs = period.as_secs(), "Gate poller started");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.stopped() => break,
            _ = ticker.tick() => {}
        }
        for gate in &mut gates {
            let outcome = gate.poll(&tracker, sender.as_ref()).await;
            tracing::debug!(gate = %gate.name(), ?outcome, "Gate polled");
        }
    }

    tracing::info!("Gate poller stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::broadcast::StubBroadcaster;
    use crate::clock::ManualClock;
    use crate::tracker::{Tracker, TrackerSettings};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn weekly() -> GateConfig {
        GateConfig {
            name: "weekly-digest".to_owned(),
            interval_days: 7,
            channel: "general".to_owned(),
            message: "Weekly leaderboard is out".to_owned(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base: TimeDelta::seconds(30),
            max: TimeDelta::seconds(300),
            alert_after: 3,
        }
    }

    fn setup() -> (SharedTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let tracker = Tracker::new(TrackerSettings::default(), clock.clone()).into_shared();
        (tracker, clock)
    }

    #[test]
    fn due_when_never_fired() {
        let gate = SchedulerGate::new(weekly(), policy());
        assert!(gate.is_due(None, start()));
    }

    #[test]
    fn due_one_hour_past_interval() {
        let gate = SchedulerGate::new(weekly(), policy());
        let now = start() + TimeDelta::days(7) + TimeDelta::hours(1);
        assert!(gate.is_due(Some(start()), now));
    }

    #[test]
    fn not_due_one_day_before_interval() {
        let gate = SchedulerGate::new(weekly(), policy());
        let now = start() + TimeDelta::days(6);
        assert!(!gate.is_due(Some(start()), now));

        // Partial days never count.
        let almost = start() + TimeDelta::days(7) - TimeDelta::seconds(1);
        assert!(!gate.is_due(Some(start()), almost));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(1), TimeDelta::seconds(30));
        assert_eq!(policy.backoff(2), TimeDelta::seconds(60));
        assert_eq!(policy.backoff(4), TimeDelta::seconds(240));
        assert_eq!(policy.backoff(5), TimeDelta::seconds(300));
        assert_eq!(policy.backoff(u32::MAX), TimeDelta::seconds(300));
    }

    #[tokio::test]
    async fn successful_fire_commits_and_marks_dirty() {
        let (tracker, _clock) = setup();
        {
            let mut guard = tracker.lock().await;
            let revision = guard.revision();
            guard.mark_persisted(revision);
        }
        let sender = StubBroadcaster::new();
        let mut gate = SchedulerGate::new(weekly(), policy());

        let outcome = gate.poll(&tracker, &sender).await;
        assert_eq!(outcome, FireOutcome::Fired);

        let guard = tracker.lock().await;
        assert_eq!(guard.gate_last_fired("weekly-digest"), Some(start()));
        assert!(guard.is_dirty());
        drop(guard);

        let sent = sender.sent().await;
        assert_eq!(
            sent,
            vec![("general".to_owned(), "Weekly leaderboard is out".to_owned())]
        );
    }

    #[tokio::test]
    async fn committed_gate_waits_for_interval() {
        let (tracker, clock) = setup();
        let sender = StubBroadcaster::new();
        let mut gate = SchedulerGate::new(weekly(), policy());

        assert_eq!(gate.poll(&tracker, &sender).await, FireOutcome::Fired);
        clock.advance(TimeDelta::days(6));
        assert_eq!(gate.poll(&tracker, &sender).await, FireOutcome::NotDue);
        clock.advance(TimeDelta::days(1) + TimeDelta::hours(1));
        assert_eq!(gate.poll(&tracker, &sender).await, FireOutcome::Fired);
        assert_eq!(sender.attempts(), 2);
    }

    #[tokio::test]
    async fn failure_stays_due_and_backs_off() {
        let (tracker, clock) = setup();
        let sender = StubBroadcaster::failing(1);
        let mut gate = SchedulerGate::new(weekly(), policy());

        let outcome = gate.poll(&tracker, &sender).await;
        assert_eq!(
            outcome,
            FireOutcome::Failed {
                consecutive_failures: 1,
                retry_at: start() + TimeDelta::seconds(30),
            }
        );
        assert_eq!(tracker.lock().await.gate_last_fired("weekly-digest"), None);

        clock.advance(TimeDelta::seconds(10));
        assert_eq!(
            gate.poll(&tracker, &sender).await,
            FireOutcome::BackingOff {
                until: start() + TimeDelta::seconds(30),
            }
        );
        assert_eq!(sender.attempts(), 1);

        clock.advance(TimeDelta::seconds(20));
        assert_eq!(gate.poll(&tracker, &sender).await, FireOutcome::Fired);
        assert_eq!(gate.consecutive_failures(), 0);
        assert_eq!(
            tracker.lock().await.gate_last_fired("weekly-digest"),
            Some(start() + TimeDelta::seconds(30))
        );
    }

    #[tokio::test]
    async fn repeated_failures_reach_alert_threshold() {
        let (tracker, clock) = setup();
        let sender = StubBroadcaster::failing(10);
        let mut gate = SchedulerGate::new(weekly(), policy());

        let mut last = FireOutcome::NotDue;
        for _ in 0..4 {
            last = gate.poll(&tracker, &sender).await;
            clock.advance(TimeDelta::seconds(300));
        }

        assert!(matches!(
            last,
            FireOutcome::Failed {
                consecutive_failures: 4,
                ..
            }
        ));
        assert!(gate.policy.should_alert(gate.consecutive_failures()));
        assert_eq!(sender.attempts(), 4);
    }

    #[tokio::test]
    async fn fire_ignores_schedule() {
        let (tracker, _clock) = setup();
        tracker
            .lock()
            .await
            .record_gate_fired("weekly-digest", start());
        let sender = StubBroadcaster::new();
        let mut gate = SchedulerGate::new(weekly(), policy());

        assert_eq!(gate.poll(&tracker, &sender).await, FireOutcome::NotDue);
        let fired_at = gate.fire(&tracker, &sender).await.unwrap();
        assert_eq!(fired_at, start());
        assert_eq!(sender.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn poller_stops_on_shutdown() {
        let (tracker, _clock) = setup();
        let sender = Arc::new(StubBroadcaster::new());
        let shutdown = Arc::new(ShutdownSignal::new());
        let gates = vec![SchedulerGate::new(weekly(), policy())];

        let handle = tokio::spawn(run_gate_poller(
            gates,
            tracker.clone(),
            sender.clone(),
            Duration::from_secs(60),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown.request_stop();
        handle.await.unwrap();

        assert_eq!(sender.attempts(), 1);
        assert!(tracker.lock().await.gate_last_fired("weekly-digest").is_some());
    }
}
