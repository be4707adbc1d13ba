//! File-backed JSON document store.
//!
//! See the crate-level docs for the on-disk layout. All writes funnel
//! through [`PersistentStore::exclusive`], which hands out a
//! [`WriteSection`] holding the store's write lock for as long as the
//! caller needs to compute and write a snapshot.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};

use crate::document::{DocumentKey, Snapshot};
use crate::error::DbError;

/// Suffix of the temporary file a document is staged in before rename.
const STAGING_SUFFIX: &str = "tmp";

/// The sole component performing storage I/O.
#[derive(Debug)]
pub struct PersistentStore {
    /// Directory holding the documents.
    root: PathBuf,
    /// Serializes every write to the documents.
    write_lock: Mutex<()>,
}

impl PersistentStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, DbError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| DbError::Io {
                path: root.clone(),
                source,
            })?;
        tracing::debug!(root = %root.display(), "Opened document store");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    /// Return the data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the full path of a document.
    pub fn path_of(&self, key: DocumentKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Load a document, falling back to `T::default()` when it is missing
    /// or cannot be read or parsed.
    ///
    /// Corruption is logged and never propagated: the process keeps
    /// serving from defaults and the next flush overwrites the bad file.
    pub async fn load<T>(&self, key: DocumentKey) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path_of(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(document = %key, "No persisted document, using defaults");
                return T::default();
            }
            Err(e) => {
                tracing::warn!(
                    document = %key,
                    path = %path.display(),
                    error = %e,
                    "Failed to read document, falling back to defaults"
                );
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(doc) => {
                tracing::debug!(document = %key, bytes = bytes.len(), "Loaded document");
                doc
            }
            Err(e) => {
                tracing::warn!(
                    document = %key,
                    path = %path.display(),
                    error = %e,
                    "Corrupt document, falling back to defaults"
                );
                T::default()
            }
        }
    }

    /// Load both documents.
    pub async fn load_snapshot(&self) -> Snapshot {
        Snapshot {
            global: self.load(DocumentKey::Global).await,
            users: self.load(DocumentKey::Users).await,
        }
    }

    /// Enter the exclusive write section.
    ///
    /// Only one section exists at a time; a second caller waits until the
    /// first section is dropped.
    pub async fn exclusive(&self) -> WriteSection<'_> {
        WriteSection {
            store: self,
            _guard: self.write_lock.lock().await,
        }
    }

    /// Overwrite a single document inside its own write section.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if serialization or any filesystem step fails.
    pub async fn save<T>(&self, key: DocumentKey, doc: &T) -> Result<(), DbError>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.exclusive().await.write(key, doc).await
    }
}

/// Proof that the caller holds the store's write lock.
#[derive(Debug)]
pub struct WriteSection<'a> {
    /// The store being written.
    store: &'a PersistentStore,
    /// Held for the lifetime of the section.
    _guard: MutexGuard<'a, ()>,
}

impl WriteSection<'_> {
    /// Overwrite one document.
    ///
    /// The document is serialized, staged in a temporary sibling file,
    /// synced, and renamed over the previous version.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Serialization`] if the document cannot be
    /// encoded, or [`DbError::Io`] if any filesystem step fails.
    pub async fn write<T>(&self, key: DocumentKey, doc: &T) -> Result<(), DbError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let mut bytes = serde_json::to_vec_pretty(doc)?;
        bytes.push(b'\n');

        let path = self.store.path_of(key);
        let staging = path.with_extension(format!("json.{STAGING_SUFFIX}"));

        write_synced(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| DbError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(document = %key, bytes = bytes.len(), "Saved document");
        Ok(())
    }

    /// Write both documents of a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if either write fails. The user table is written
    /// first; if the global document then fails, the next flush rewrites
    /// both.
    pub async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), DbError> {
        self.write(DocumentKey::Users, &snapshot.users).await?;
        self.write(DocumentKey::Global, &snapshot.global).await
    }
}

/// Create `path`, write `bytes` and sync to disk.
async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), DbError> {
    let io_err = |source| DbError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    file.write_all(bytes).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(())
}
