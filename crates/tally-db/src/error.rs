//! Error types for the storage layer.
//!
//! Only writes surface errors. Read-side problems are logged and degrade
//! to default documents inside [`PersistentStore::load`].
//!
//! [`PersistentStore::load`]: crate::PersistentStore::load

use std::path::PathBuf;

/// Errors that can occur while writing documents.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A document could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
