//! Persisted records for users and global counters.
//!
//! These are the two logical documents written by the persistence layer:
//! the user table ([`UserTable`]) and the global state ([`GlobalState`]).
//! Both use [`BTreeMap`] so serialized output is ordered and repeated
//! saves of unchanged state are byte-identical.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::InteractionKind;
use crate::ids::UserId;

/// The persisted user table, keyed by stable user identifier.
pub type UserTable = BTreeMap<UserId, UserRecord>;

// =============================================================================
// UserRecord
// =============================================================================

/// Per-user activity counters and derived points.
///
/// Counters are monotonic. Points only ever increase: by the ten-message
/// bonus each time `message_count` reaches a multiple of ten, and by the
/// command bonus for every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable user identifier.
    pub id: UserId,
    /// Display name, filled on first observation and never overwritten.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Transport handle (e.g. `@name`), first write wins.
    #[serde(default)]
    pub handle: Option<String>,
    /// Number of plain messages sent.
    #[serde(default)]
    pub message_count: u64,
    /// Number of bot commands issued.
    #[serde(default)]
    pub command_count: u64,
    /// Accumulated leaderboard points.
    #[serde(default)]
    pub points: u64,
    /// When the user was first observed.
    pub joined_at: DateTime<Utc>,
    /// When the user was last active.
    pub last_active_at: DateTime<Utc>,
}

impl UserRecord {
    /// Create a zero-valued record first observed at `now`.
    pub const fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: None,
            handle: None,
            message_count: 0,
            command_count: 0,
            points: 0,
            joined_at: now,
            last_active_at: now,
        }
    }

    /// Fill `display_name` and `handle` only where they are still empty.
    pub fn fill_names(&mut self, display_name: Option<&str>, handle: Option<&str>) {
        if self.display_name.is_none() {
            self.display_name = display_name.map(str::to_owned);
        }
        if self.handle.is_none() {
            self.handle = handle.map(str::to_owned);
        }
    }
}

// =============================================================================
// GlobalState
// =============================================================================

/// Process-wide counters and gate timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    /// Last successful firing of each named gate.
    #[serde(default)]
    pub gate_timestamps: BTreeMap<String, DateTime<Utc>>,
    /// Total messages observed across all users.
    #[serde(default)]
    pub total_messages: u64,
    /// Number of join events observed.
    #[serde(default)]
    pub new_members: u64,
    /// When the store was first started. `None` until the first start
    /// stamps it.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

// =============================================================================
// InteractionEvent
// =============================================================================

/// A single interaction delivered by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// The user who interacted.
    pub user_id: UserId,
    /// Display name reported by the transport, if any.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Handle reported by the transport, if any.
    #[serde(default)]
    pub handle: Option<String>,
    /// What kind of interaction this was.
    pub kind: InteractionKind,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn fill_names_is_first_write_wins() {
        let mut record = UserRecord::new(UserId::new(1), DateTime::<Utc>::default());
        record.fill_names(Some("Ani"), None);
        record.fill_names(Some("Other"), Some("@ani"));
        record.fill_names(None, Some("@changed"));

        assert_eq!(record.display_name.as_deref(), Some("Ani"));
        assert_eq!(record.handle.as_deref(), Some("@ani"));
    }

    #[test]
    fn global_state_tolerates_missing_fields() {
        let state: GlobalState = serde_json::from_str(r#"{"total_messages": 5}"#).unwrap();
        assert_eq!(state.total_messages, 5);
        assert_eq!(state.new_members, 0);
        assert!(state.gate_timestamps.is_empty());
        assert!(state.started_at.is_none());
    }

    #[test]
    fn interaction_event_parses_from_json_line() {
        let line = r#"{"user_id": 12, "display_name": "Mher", "kind": "command"}"#;
        let event: InteractionEvent = serde_json::from_str(line).unwrap();
        assert_eq!(event.user_id, UserId::new(12));
        assert_eq!(event.kind, InteractionKind::Command);
        assert!(event.handle.is_none());
    }
}
