//! Shared type definitions for the tally interaction store.
//!
//! This crate is the single source of truth for the records that flow
//! between the ledger, the caches, the persistence layer and the engine.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrapper for chat user identifiers
//! - [`enums`] -- Interaction kinds delivered by the transport layer
//! - [`structs`] -- Persisted records ([`UserRecord`], [`GlobalState`])
//! - [`views`] -- Structured read models returned to the command layer

pub mod enums;
pub mod ids;
pub mod structs;
pub mod views;

// Re-export all public types at crate root for convenience.
pub use enums::InteractionKind;
pub use ids::UserId;
pub use structs::{GlobalState, InteractionEvent, UserRecord, UserTable};
pub use views::{ProfileView, StatsView, TopEntry, UserSummary};
