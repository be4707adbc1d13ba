//! The activity ledger: per-user counters plus global counters.
//!
//! The [`ActivityLedger`] is the in-memory authority for every user record
//! and for the process-wide counters. Callers (the tracker in
//! `tally-core`) are responsible for dirty tracking and cache
//! invalidation; the ledger only applies the counter and point rules.
//!
//! # Design
//!
//! - **Lazy upsert**: users are created on first observation and never
//!   removed.
//! - **Monotonic**: counters and points only grow.
//! - **All-or-nothing**: every new counter value is computed with checked
//!   arithmetic before anything is written, so an overflow leaves the
//!   record untouched.

use chrono::{DateTime, Utc};
use tally_types::{GlobalState, UserId, UserRecord, UserTable};

use crate::LedgerError;
use crate::rules::PointRules;

/// Outcome of a recording call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    /// Whether the user record was created by this call.
    pub user_created: bool,
    /// Points awarded by this call.
    pub points_awarded: u64,
}

/// The authoritative table of user counters and global counters.
#[derive(Debug, Clone, Default)]
pub struct ActivityLedger {
    /// User records keyed by identifier.
    users: UserTable,
    /// Process-wide counters and gate timestamps.
    global: GlobalState,
    /// Point rules applied on every recording.
    rules: PointRules,
}

impl ActivityLedger {
    /// Create an empty ledger with the given point rules.
    pub fn new(rules: PointRules) -> Self {
        Self {
            users: UserTable::new(),
            global: GlobalState::default(),
            rules,
        }
    }

    /// Rebuild a ledger from previously persisted documents.
    pub const fn from_parts(users: UserTable, global: GlobalState, rules: PointRules) -> Self {
        Self {
            users,
            global,
            rules,
        }
    }

    /// Return the active point rules.
    pub const fn rules(&self) -> PointRules {
        self.rules
    }

    /// Return the full user table.
    pub const fn users(&self) -> &UserTable {
        &self.users
    }

    /// Return the global counters.
    pub const fn global(&self) -> &GlobalState {
        &self.global
    }

    /// Return the number of known users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Return whether no user has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Look up a user without creating it.
    pub fn user(&self, id: UserId) -> Option<&UserRecord> {
        self.users.get(&id)
    }

    /// Return the user's record, creating a zero-valued one if absent.
    ///
    /// The boolean is `true` when the record was created by this call.
    pub fn get_user(&mut self, id: UserId, now: DateTime<Utc>) -> (&UserRecord, bool) {
        let created = !self.users.contains_key(&id);
        let record = self
            .users
            .entry(id)
            .or_insert_with(|| UserRecord::new(id, now));
        if created {
            tracing::debug!(user = %id, "Created user record");
        }
        (record, created)
    }

    /// Record a plain message from `id`.
    ///
    /// Upserts the user, increments the message counter, refreshes
    /// `last_active_at`, fills empty name fields and awards the ten-message
    /// bonus when the new count lands on a milestone.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CounterOverflow`] if any counter would
    /// overflow; nothing is modified in that case (beyond the lazy upsert).
    pub fn record_interaction(
        &mut self,
        id: UserId,
        display_name: Option<&str>,
        handle: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Recorded, LedgerError> {
        let user_created = !self.users.contains_key(&id);
        let user = self
            .users
            .entry(id)
            .or_insert_with(|| UserRecord::new(id, now));

        let message_count = user
            .message_count
            .checked_add(1)
            .ok_or(LedgerError::CounterOverflow {
                counter: "message_count",
            })?;
        let points_awarded = self.rules.message_award(message_count);
        let points = user
            .points
            .checked_add(points_awarded)
            .ok_or(LedgerError::CounterOverflow { counter: "points" })?;
        let total_messages =
            self.global
                .total_messages
                .checked_add(1)
                .ok_or(LedgerError::CounterOverflow {
                    counter: "total_messages",
                })?;

        user.message_count = message_count;
        user.points = points;
        user.last_active_at = now;
        user.fill_names(display_name, handle);
        self.global.total_messages = total_messages;

        if points_awarded > 0 {
            tracing::debug!(
                user = %id,
                message_count,
                points,
                "Message milestone reached"
            );
        }

        Ok(Recorded {
            user_created,
            points_awarded,
        })
    }

    /// Record a bot command from `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CounterOverflow`] if a counter would overflow.
    pub fn record_command(
        &mut self,
        id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Recorded, LedgerError> {
        let user_created = !self.users.contains_key(&id);
        let user = self
            .users
            .entry(id)
            .or_insert_with(|| UserRecord::new(id, now));

        let command_count = user
            .command_count
            .checked_add(1)
            .ok_or(LedgerError::CounterOverflow {
                counter: "command_count",
            })?;
        let points_awarded = self.rules.command_bonus;
        let points = user
            .points
            .checked_add(points_awarded)
            .ok_or(LedgerError::CounterOverflow { counter: "points" })?;

        user.command_count = command_count;
        user.points = points;
        user.last_active_at = now;

        Ok(Recorded {
            user_created,
            points_awarded,
        })
    }

    /// Record a join event: counts a new member and upserts the user
    /// without touching its activity counters.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CounterOverflow`] if `new_members` would
    /// overflow.
    pub fn record_new_member(
        &mut self,
        id: UserId,
        display_name: Option<&str>,
        handle: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Recorded, LedgerError> {
        let new_members =
            self.global
                .new_members
                .checked_add(1)
                .ok_or(LedgerError::CounterOverflow {
                    counter: "new_members",
                })?;

        let user_created = !self.users.contains_key(&id);
        let user = self
            .users
            .entry(id)
            .or_insert_with(|| UserRecord::new(id, now));
        user.fill_names(display_name, handle);
        self.global.new_members = new_members;

        Ok(Recorded {
            user_created,
            points_awarded: 0,
        })
    }

    /// Return when the named gate last fired successfully.
    pub fn gate_last_fired(&self, gate: &str) -> Option<DateTime<Utc>> {
        self.global.gate_timestamps.get(gate).copied()
    }

    /// Commit a successful gate firing.
    pub fn record_gate_fired(&mut self, gate: &str, now: DateTime<Utc>) {
        self.global.gate_timestamps.insert(gate.to_owned(), now);
    }

    /// Stamp `started_at` if it has never been set. Returns `true` when the
    /// stamp was applied.
    pub fn stamp_started(&mut self, now: DateTime<Utc>) -> bool {
        if self.global.started_at.is_some() {
            return false;
        }
        self.global.started_at = Some(now);
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn message_points_follow_milestones() {
        for bonus in [1_u64, 3] {
            let rules = PointRules {
                per_ten_messages: bonus,
                command_bonus: 0,
            };
            for n in 0_u64..35 {
                let mut ledger = ActivityLedger::new(rules);
                let id = UserId::new(1);
                for _ in 0..n {
                    ledger.record_interaction(id, None, None, at(1)).unwrap();
                }
                let points = ledger.user(id).map_or(0, |u| u.points);
                assert_eq!(points, (n / 10) * bonus, "n = {n}, bonus = {bonus}");
            }
        }
    }

    #[test]
    fn tenth_message_awards_exactly_once() {
        let mut ledger = ActivityLedger::new(PointRules::default());
        let id = UserId::new(5);
        let mut awards = Vec::new();
        for _ in 0..10 {
            awards.push(
                ledger
                    .record_interaction(id, None, None, at(1))
                    .unwrap()
                    .points_awarded,
            );
        }
        assert_eq!(awards.iter().filter(|a| **a > 0).count(), 1);
        assert_eq!(awards.last().copied(), Some(1));
    }

    #[test]
    fn interaction_upserts_and_tracks_activity() {
        let mut ledger = ActivityLedger::new(PointRules::default());
        let id = UserId::new(9);

        let first = ledger
            .record_interaction(id, Some("Ani"), Some("@ani"), at(1))
            .unwrap();
        assert!(first.user_created);

        let second = ledger
            .record_interaction(id, Some("Renamed"), None, at(5))
            .unwrap();
        assert!(!second.user_created);

        let user = ledger.user(id).unwrap();
        assert_eq!(user.message_count, 2);
        assert_eq!(user.joined_at, at(1));
        assert_eq!(user.last_active_at, at(5));
        assert_eq!(user.display_name.as_deref(), Some("Ani"));
        assert_eq!(user.handle.as_deref(), Some("@ani"));
        assert_eq!(ledger.global().total_messages, 2);
    }

    #[test]
    fn command_awards_bonus_and_keeps_messages() {
        let mut ledger = ActivityLedger::new(PointRules {
            per_ten_messages: 1,
            command_bonus: 4,
        });
        let id = UserId::new(2);
        ledger.record_command(id, at(2)).unwrap();
        ledger.record_command(id, at(3)).unwrap();

        let user = ledger.user(id).unwrap();
        assert_eq!(user.command_count, 2);
        assert_eq!(user.message_count, 0);
        assert_eq!(user.points, 8);
        assert_eq!(user.last_active_at, at(3));
        assert_eq!(ledger.global().total_messages, 0);
    }

    #[test]
    fn get_user_creates_zero_record_once() {
        let mut ledger = ActivityLedger::new(PointRules::default());
        let id = UserId::new(3);

        let (record, created) = ledger.get_user(id, at(4));
        assert!(created);
        assert_eq!(record.points, 0);
        assert_eq!(record.joined_at, at(4));

        let (_, created_again) = ledger.get_user(id, at(6));
        assert!(!created_again);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn join_counts_new_member_without_activity() {
        let mut ledger = ActivityLedger::new(PointRules::default());
        let id = UserId::new(11);
        ledger
            .record_new_member(id, Some("Hovo"), None, at(1))
            .unwrap();

        assert_eq!(ledger.global().new_members, 1);
        let user = ledger.user(id).unwrap();
        assert_eq!(user.message_count, 0);
        assert_eq!(user.display_name.as_deref(), Some("Hovo"));
    }

    #[test]
    fn overflow_leaves_record_untouched() {
        let mut users = UserTable::new();
        let id = UserId::new(1);
        let mut record = UserRecord::new(id, at(1));
        record.command_count = u64::MAX;
        users.insert(id, record.clone());
        let mut ledger = ActivityLedger::from_parts(users, GlobalState::default(), PointRules::default());

        let result = ledger.record_command(id, at(9));
        assert!(matches!(
            result,
            Err(LedgerError::CounterOverflow {
                counter: "command_count"
            })
        ));
        assert_eq!(ledger.user(id), Some(&record));
    }

    #[test]
    fn started_at_is_stamped_once() {
        let mut ledger = ActivityLedger::new(PointRules::default());
        assert!(ledger.stamp_started(at(1)));
        assert!(!ledger.stamp_started(at(2)));
        assert_eq!(ledger.global().started_at, Some(at(1)));
    }

    #[test]
    fn gate_timestamps_round_trip() {
        let mut ledger = ActivityLedger::new(PointRules::default());
        assert!(ledger.gate_last_fired("weekly_digest").is_none());
        ledger.record_gate_fired("weekly_digest", at(7));
        assert_eq!(ledger.gate_last_fired("weekly_digest"), Some(at(7)));
    }
}
