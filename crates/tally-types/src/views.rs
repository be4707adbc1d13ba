//! Structured read models handed to the command layer.
//!
//! Text formatting is the caller's concern; these types only carry data.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Identity fields shown next to a leaderboard entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    /// The user identifier.
    pub id: UserId,
    /// Display name, if known.
    pub display_name: Option<String>,
    /// Handle, if known.
    pub handle: Option<String>,
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopEntry {
    /// 1-based rank.
    pub rank: usize,
    /// Who holds this rank.
    pub user: UserSummary,
    /// Points held.
    pub points: u64,
    /// Messages sent.
    pub message_count: u64,
}

/// A single user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileView {
    /// 1-based rank, `None` when unranked.
    pub rank: Option<usize>,
    /// Points held.
    pub points: u64,
    /// Messages sent.
    pub message_count: u64,
    /// Commands issued.
    pub command_count: u64,
    /// Whole days since the user was first observed.
    pub days_since_join: i64,
}

/// Chat-wide statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsView {
    /// Whole days since the store was first started.
    pub days_running: i64,
    /// Number of known users.
    pub total_users: usize,
    /// Users active on today's calendar date.
    pub active_today: usize,
    /// Users active within the last seven days.
    pub active_this_week: usize,
    /// Total messages observed.
    pub total_messages: u64,
    /// Join events observed.
    pub new_members: u64,
}
