//! Tracker, caches, scheduler gates and autosave loop for the tally store.
//!
//! This crate owns everything that happens between an interaction arriving
//! and it reaching disk:
//!
//! ```text
//! feed event -> Tracker (ledger + cache invalidation + dirty flag)
//!            -> autosave flush -> PersistentStore
//! ```
//!
//! Scheduler gates poll the tracker independently and commit their firing
//! timestamps through the same dirty path.
//!
//! # Modules
//!
//! - [`autosave`] -- Dirty-gated flush and the periodic autosave loop.
//! - [`broadcast`] -- [`BroadcastSender`] trait and [`StubBroadcaster`].
//! - [`cache`] -- TTL-bounded ranking and active-count caches.
//! - [`clock`] -- Injectable time source and calendar helpers.
//! - [`config`] -- Configuration loading from `tally-config.yaml`.
//! - [`feed`] -- Interaction feed decoding and the feed task.
//! - [`gate`] -- Day-interval broadcast triggers with retry backoff.
//! - [`shutdown`] -- Cooperative stop signal for the background loops.
//! - [`tracker`] -- The single owner of mutable store state.
//!
//! [`BroadcastSender`]: broadcast::BroadcastSender
//! [`StubBroadcaster`]: broadcast::StubBroadcaster

pub mod autosave;
pub mod broadcast;
pub mod cache;
pub mod clock;
pub mod config;
pub mod feed;
pub mod gate;
pub mod shutdown;
pub mod tracker;
