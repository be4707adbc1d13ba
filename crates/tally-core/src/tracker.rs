//! The tracker: single owner of all mutable store state.
//!
//! A [`Tracker`] bundles the [`ActivityLedger`], both caches, the clock and
//! the dirty flag. Every mutation goes through it, so cache invalidation
//! and dirty marking cannot be forgotten at a call site. It is constructed
//! once at startup and shared as a [`SharedTracker`] behind one coarse
//! mutex.
//!
//! # Dirty tracking
//!
//! The dirty flag is a revision counter. Each mutation bumps `revision`;
//! a flush records the revision it captured and, after a successful write,
//! calls [`Tracker::mark_persisted`]. Mutations that land while the write
//! is in flight keep the tracker dirty.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, TimeDelta, Utc};
use tally_db::Snapshot;
use tally_ledger::{ActivityLedger, LedgerError, PointRules, Recorded};
use tally_types::{
    InteractionEvent, InteractionKind, ProfileView, StatsView, TopEntry, UserId, UserRecord,
    UserSummary,
};
use tokio::sync::Mutex;

use crate::cache::{ActiveCountCache, RankingCache};
use crate::clock::{Clock, elapsed_whole_days};
use crate::config::{ConfigError, TallyConfig};

/// Window, in days, reported as "active this week".
pub const WEEK_WINDOW_DAYS: u32 = 7;

/// The tracker shared between the feed, the gates and the autosave loop.
pub type SharedTracker = Arc<Mutex<Tracker>>;

/// Tunables for a [`Tracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// Point rules handed to the ledger.
    pub rules: PointRules,
    /// Ranking cache lifetime.
    pub ranking_ttl: TimeDelta,
    /// Active-count cache lifetime.
    pub active_count_ttl: TimeDelta,
    /// Offset used to decide the calendar date.
    pub utc_offset: FixedOffset,
}

impl TrackerSettings {
    /// Build settings from the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the calendar offset is out of range.
    pub fn from_config(config: &TallyConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            rules: config.points.rules(),
            ranking_ttl: config.cache.ranking_ttl(),
            active_count_ttl: config.cache.active_count_ttl(),
            utc_offset: config.calendar.offset()?,
        })
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            rules: PointRules::default(),
            ranking_ttl: TimeDelta::seconds(60),
            active_count_ttl: TimeDelta::seconds(300),
            utc_offset: Utc.fix(),
        }
    }
}

/// Owner of the ledger, the caches and the dirty flag.
#[derive(Debug)]
pub struct Tracker {
    /// Authoritative counters.
    ledger: ActivityLedger,
    /// Leaderboard view.
    ranking: RankingCache,
    /// Active-user counts.
    active: ActiveCountCache,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Bumped on every mutation.
    revision: u64,
    /// Highest revision known to be on disk.
    persisted_revision: u64,
}

impl Tracker {
    /// Create an empty tracker, stamping `started_at` with the clock.
    pub fn new(settings: TrackerSettings, clock: Arc<dyn Clock>) -> Self {
        Self::restore(Snapshot::default(), settings, clock)
    }

    /// Rebuild a tracker from the last persisted snapshot.
    ///
    /// The restored state counts as persisted. If the snapshot has never
    /// been stamped with a start time, it is stamped now and the tracker
    /// starts dirty so the stamp reaches disk.
    pub fn restore(snapshot: Snapshot, settings: TrackerSettings, clock: Arc<dyn Clock>) -> Self {
        let ledger = ActivityLedger::from_parts(snapshot.users, snapshot.global, settings.rules);
        let mut tracker = Self {
            ledger,
            ranking: RankingCache::new(settings.ranking_ttl),
            active: ActiveCountCache::new(settings.active_count_ttl, settings.utc_offset),
            clock,
            revision: 0,
            persisted_revision: 0,
        };

        let now = tracker.now();
        if tracker.ledger.stamp_started(now) {
            tracker.touch();
        }

        tracing::info!(
            users = tracker.ledger.len(),
            total_messages = tracker.ledger.global().total_messages,
            "Tracker restored"
        );
        tracker
    }

    /// Wrap the tracker for sharing between tasks.
    pub fn into_shared(self) -> SharedTracker {
        Arc::new(Mutex::new(self))
    }

    /// Current time according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Read-only access to the ledger.
    pub const fn ledger(&self) -> &ActivityLedger {
        &self.ledger
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Record a plain message.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if a counter would overflow.
    pub fn record_interaction(
        &mut self,
        id: UserId,
        display_name: Option<&str>,
        handle: Option<&str>,
    ) -> Result<Recorded, LedgerError> {
        let now = self.now();
        let recorded = self
            .ledger
            .record_interaction(id, display_name, handle, now)?;
        self.touch();
        self.invalidate_views();
        Ok(recorded)
    }

    /// Record a bot command.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if a counter would overflow.
    pub fn record_command(&mut self, id: UserId) -> Result<Recorded, LedgerError> {
        let now = self.now();
        let recorded = self.ledger.record_command(id, now)?;
        self.touch();
        // Commands refresh last_active_at too, so both views go stale.
        self.invalidate_views();
        Ok(recorded)
    }

    /// Record a join event.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if a counter would overflow.
    pub fn record_new_member(
        &mut self,
        id: UserId,
        display_name: Option<&str>,
        handle: Option<&str>,
    ) -> Result<Recorded, LedgerError> {
        let now = self.now();
        let recorded = self
            .ledger
            .record_new_member(id, display_name, handle, now)?;
        self.touch();
        if recorded.user_created {
            self.invalidate_views();
        }
        Ok(recorded)
    }

    /// Apply an event from the interaction feed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if a counter would overflow.
    pub fn apply(&mut self, event: &InteractionEvent) -> Result<Recorded, LedgerError> {
        let display_name = event.display_name.as_deref();
        let handle = event.handle.as_deref();
        match event.kind {
            InteractionKind::Message => {
                self.record_interaction(event.user_id, display_name, handle)
            }
            InteractionKind::Command => self.record_command(event.user_id),
            InteractionKind::Join => self.record_new_member(event.user_id, display_name, handle),
        }
    }

    /// Return the user's record, creating a zero-valued one if absent.
    pub fn get_user(&mut self, id: UserId) -> UserRecord {
        let now = self.now();
        let (record, created) = self.ledger.get_user(id, now);
        let record = record.clone();
        if created {
            self.touch();
            self.invalidate_views();
        }
        record
    }

    /// Commit a successful gate firing at `at`.
    pub fn record_gate_fired(&mut self, gate: &str, at: DateTime<Utc>) {
        self.ledger.record_gate_fired(gate, at);
        self.touch();
    }

    /// When the named gate last fired successfully.
    pub fn gate_last_fired(&self, gate: &str) -> Option<DateTime<Utc>> {
        self.ledger.gate_last_fired(gate)
    }

    // -----------------------------------------------------------------------
    // Cached views
    // -----------------------------------------------------------------------

    /// Up to `n` user ids ordered by points, best first.
    pub fn top(&mut self, n: usize) -> Vec<UserId> {
        let now = self.now();
        self.ranking.top(self.ledger.users(), n, now)
    }

    /// 1-based rank of `id`, or `None` if the user is unknown.
    pub fn rank(&mut self, id: UserId) -> Option<usize> {
        let now = self.now();
        self.ranking.rank(self.ledger.users(), id, now)
    }

    /// Number of users active within `window_days` (0 = today).
    pub fn active_count(&mut self, window_days: u32) -> usize {
        let now = self.now();
        self.active.count(self.ledger.users(), window_days, now)
    }

    /// Leaderboard rows for the top `n` users.
    pub fn render_top(&mut self, n: usize) -> Vec<TopEntry> {
        let ids = self.top(n);
        ids.into_iter()
            .enumerate()
            .filter_map(|(pos, id)| {
                self.ledger.user(id).map(|user| TopEntry {
                    rank: pos.saturating_add(1),
                    user: UserSummary {
                        id,
                        display_name: user.display_name.clone(),
                        handle: user.handle.clone(),
                    },
                    points: user.points,
                    message_count: user.message_count,
                })
            })
            .collect()
    }

    /// Profile of `id`, creating the user if it has never been seen.
    pub fn render_profile(&mut self, id: UserId) -> ProfileView {
        let user = self.get_user(id);
        let rank = self.rank(id);
        let now = self.now();
        ProfileView {
            rank,
            points: user.points,
            message_count: user.message_count,
            command_count: user.command_count,
            days_since_join: elapsed_whole_days(user.joined_at, now).max(0),
        }
    }

    /// Chat-wide statistics.
    pub fn render_stats(&mut self) -> StatsView {
        let now = self.now();
        let active_today = self.active_count(0);
        let active_this_week = self.active_count(WEEK_WINDOW_DAYS);
        let global = self.ledger.global();
        StatsView {
            days_running: global
                .started_at
                .map_or(0, |started| elapsed_whole_days(started, now).max(0)),
            total_users: self.ledger.len(),
            active_today,
            active_this_week,
            total_messages: global.total_messages,
            new_members: global.new_members,
        }
    }

    // -----------------------------------------------------------------------
    // Persistence bookkeeping
    // -----------------------------------------------------------------------

    /// Whether there are changes not yet on disk.
    pub const fn is_dirty(&self) -> bool {
        self.revision != self.persisted_revision
    }

    /// Current mutation revision.
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Copy both documents for a flush.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            global: self.ledger.global().clone(),
            users: self.ledger.users().clone(),
        }
    }

    /// Record that everything up to `revision` reached disk.
    pub fn mark_persisted(&mut self, revision: u64) {
        self.persisted_revision = self.persisted_revision.max(revision);
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn invalidate_views(&mut self) {
        self.ranking.invalidate();
        self.active.invalidate();
    }
}
