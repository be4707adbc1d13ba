//! Authoritative activity ledger for the tally store.
//!
//! Every interaction observed by the chat transport lands here. The ledger
//! owns the user table and the global counters and applies the point
//! rules. It never performs I/O and never panics; counter overflow is
//! reported as a [`LedgerError`].
//!
//! # Modules
//!
//! - [`ledger`] -- The [`ActivityLedger`] struct and its recording methods.
//! - [`rules`] -- The [`PointRules`] that turn activity into points.
//!
//! # Point Rules
//!
//! | Event | Effect |
//! |-------|--------|
//! | Message | `message_count += 1`; `+per_ten_messages` when the new count is a multiple of 10 |
//! | Command | `command_count += 1`; `+command_bonus` |
//! | Join | `new_members += 1`; user upserted, counters untouched |
//!
//! # Usage
//!
//! ```
//! use chrono::Utc;
//! use tally_ledger::{ActivityLedger, PointRules};
//! use tally_types::UserId;
//!
//! let mut ledger = ActivityLedger::new(PointRules::default());
//! let user = UserId::new(7);
//! let now = Utc::now();
//!
//! for _ in 0..10 {
//!     ledger.record_interaction(user, Some("Ani"), None, now).ok();
//! }
//!
//! assert_eq!(ledger.user(user).map(|u| u.points), Some(1));
//! ```

pub mod ledger;
pub mod rules;

// Re-export primary types at crate root.
pub use ledger::{ActivityLedger, Recorded};
pub use rules::{MESSAGE_MILESTONE, PointRules};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when recording activity.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A counter would exceed `u64::MAX`.
    #[error("counter overflow: {counter}")]
    CounterOverflow {
        /// Which counter overflowed.
        counter: &'static str,
    },
}
