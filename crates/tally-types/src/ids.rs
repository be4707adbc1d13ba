//! Type-safe identifier wrapper for chat users.
//!
//! Chat transports hand out signed 64-bit user identifiers. Wrapping them
//! prevents accidental mixing with counters or timestamps at compile time.
//! The wrapper serializes transparently, so it can be used as a JSON map
//! key in the persisted user table.

use serde::{Deserialize, Serialize};

/// Stable identifier of a chat user as assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Wrap a raw transport identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Return the inner transport identifier.
    pub const fn into_inner(self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl From<UserId> for i64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}
