//! Logical documents managed by the store.

use serde::{Deserialize, Serialize};
use tally_types::{GlobalState, UserTable};

/// Identifies one of the persisted documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    /// The [`GlobalState`] document.
    Global,
    /// The [`UserTable`] document.
    Users,
}

impl DocumentKey {
    /// File name of the document inside the data directory.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Global => "global.json",
            Self::Users => "users.json",
        }
    }
}

impl core::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Both documents captured at the same instant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Global counters and gate timestamps.
    pub global: GlobalState,
    /// Every known user.
    pub users: UserTable,
}
