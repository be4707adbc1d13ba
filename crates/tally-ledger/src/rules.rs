//! Point rules applied by the ledger.

/// Number of messages between ten-message bonuses.
pub const MESSAGE_MILESTONE: u64 = 10;

/// How activity is converted into leaderboard points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointRules {
    /// Points awarded each time a user's message count reaches a multiple
    /// of [`MESSAGE_MILESTONE`].
    pub per_ten_messages: u64,
    /// Points awarded for every command.
    pub command_bonus: u64,
}

impl PointRules {
    /// Points earned by the message that brings a user to `message_count`.
    ///
    /// Only the message that lands exactly on a milestone earns the bonus,
    /// so each threshold is crossed at most once.
    pub fn message_award(&self, message_count: u64) -> u64 {
        if message_count > 0 && message_count.checked_rem(MESSAGE_MILESTONE) == Some(0) {
            self.per_ten_messages
        } else {
            0
        }
    }
}

impl Default for PointRules {
    fn default() -> Self {
        Self {
            per_ten_messages: 1,
            command_bonus: 2,
        }
    }
}
