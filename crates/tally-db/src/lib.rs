//! Durable document storage for the tally store.
//!
//! The store persists two logical JSON documents in a data directory:
//!
//! ```text
//! <data_dir>/
//!     |-- global.json   (GlobalState: counters, gate timestamps, started_at)
//!     +-- users.json    (UserTable: user id -> UserRecord)
//! ```
//!
//! Loading never fails: a missing document yields the default value and a
//! corrupt one is logged and replaced by the default. Saving goes through a
//! single exclusive write section so concurrent flushes cannot interleave,
//! and every document is written to a temporary sibling and renamed into
//! place so a crash mid-write leaves the previous document intact.
//!
//! # Modules
//!
//! - [`document`] -- Document keys and the combined [`Snapshot`]
//! - [`store`] -- The [`PersistentStore`] and its [`WriteSection`]
//! - [`error`] -- Shared error types

pub mod document;
pub mod error;
pub mod store;

// Re-export primary types for convenience.
pub use document::{DocumentKey, Snapshot};
pub use error::DbError;
pub use store::{PersistentStore, WriteSection};
