//! Persistence layer
//!
//! Defines the [`MailStore`] contract and its two backends:
//!
//! - **flat file**: `users.db` and `emails.db`, each one serialized collection,
//!   rewritten whole on every mutation
//! - **sqlite**: one row per user and per stored email copy, with an
//!   in-memory cache refreshed on reload
//!
//! The backend is picked once from configuration via [`open`]; the two are
//! never active together. Both keep attachments in the same
//! [`AttachmentStore`] layout.

mod attachments;
mod conversions;
mod flat_file;
mod sqlite;

pub use attachments::{attachment_display_name, AttachmentStore};
pub use conversions::{join_list, split_list};
pub use flat_file::FlatFileStore;
pub use sqlite::SqliteStore;

use crate::model::{Email, User};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// An attachment reference (or other key) did not resolve
    #[error("not found: {0}")]
    NotFound(String),

    /// Durable storage could not be read or written
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Stored content could not be decoded
    #[error("corrupt data in {path}: {reason}")]
    CorruptData { path: PathBuf, reason: String },

    /// Caller-supplied data was rejected
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True for failures of the underlying medium (disk, database)
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            StoreError::StorageUnavailable(_)
                | StoreError::Io(_)
                | StoreError::Database(_)
                | StoreError::Serialization(_)
        )
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Which backend is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Two serialized collection files
    FlatFile,
    /// SQLite tables
    #[default]
    Sqlite,
}

impl BackendKind {
    /// Configuration name
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::FlatFile => "flat_file",
            BackendKind::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "flat_file" | "file" => Ok(BackendKind::FlatFile),
            "sqlite" | "db" => Ok(BackendKind::Sqlite),
            other => Err(format!(
                "unknown backend '{}', expected flat_file or sqlite",
                other
            )),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::FlatFileStore {}
    impl Sealed for super::SqliteStore {}
}

/// Contract every mail backend satisfies
///
/// Each store owns its in-memory collections behind a single lock. Readers get
/// snapshots; writers serialize on the lock, and the same lock is held around
/// all load and save I/O so a reload never interleaves with a save.
pub trait MailStore: sealed::Sealed + Send + Sync {
    /// Backend in use
    fn kind(&self) -> BackendKind;

    /// Drop the cache and re-read everything from durable storage
    ///
    /// A missing, empty, or unreadable store yields empty collections.
    fn reload(&self) -> Result<()>;

    /// Flush the whole in-memory state to durable storage
    fn save_all(&self) -> Result<()>;

    /// Snapshot of all users
    fn users(&self) -> Vec<User>;

    /// Insert a user; rejects a duplicate address
    fn add_user(&self, user: User) -> Result<()>;

    /// Persist new field values for the user with the same address
    fn update_user(&self, user: &User) -> Result<()>;

    /// Remove a user and every email they sent
    ///
    /// Copies where the user is only a recipient are left alone.
    fn delete_user(&self, user: &User) -> Result<()>;

    /// Snapshot of all stored email copies
    fn emails(&self) -> Vec<Email>;

    /// Append copies, assign their ids, and persist them as one unit
    ///
    /// Either every copy is stored or none is, in memory and on disk.
    fn add_emails(&self, emails: Vec<Email>) -> Result<Vec<Email>>;

    /// Append one copy, assign its id, persist it, and return the stored copy
    fn add_email(&self, email: Email) -> Result<Email> {
        self.add_emails(vec![email])?
            .pop()
            .ok_or_else(|| StoreError::StorageUnavailable("no copy was stored".to_string()))
    }

    /// Edit the live email collection in place under the store lock
    ///
    /// Changes become durable on the next [`MailStore::save_all`].
    fn with_emails_mut(&self, edit: &mut dyn FnMut(&mut Vec<Email>));

    /// Copy an external file into engine-owned storage
    fn save_attachment(&self, source: &Path) -> Result<String>;

    /// Delete a stored attachment that no email refers to
    fn remove_attachment(&self, reference: &str) -> Result<()>;

    /// Resolve an attachment reference to a readable file
    fn attachment(&self, reference: &str) -> Option<PathBuf>;
}

/// Open the configured backend rooted at `data_dir`
///
/// Failure here leaves the process without any store.
pub fn open(kind: BackendKind, data_dir: &Path) -> Result<Arc<dyn MailStore>> {
    tracing::info!(backend = %kind, data_dir = %data_dir.display(), "Opening mail store");

    let store: Arc<dyn MailStore> = match kind {
        BackendKind::FlatFile => Arc::new(FlatFileStore::open(data_dir)?),
        BackendKind::Sqlite => Arc::new(SqliteStore::open(data_dir)?),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_each_backend() {
        for kind in [BackendKind::FlatFile, BackendKind::Sqlite] {
            let dir = TempDir::new().unwrap();
            let store = open(kind, dir.path()).unwrap();
            assert_eq!(store.kind(), kind);
            assert!(store.users().is_empty());
            assert!(store.emails().is_empty());
        }
    }

    #[test]
    fn test_backend_kind_names() {
        assert_eq!(BackendKind::FlatFile.to_string(), "flat_file");
        assert_eq!(BackendKind::default(), BackendKind::Sqlite);
        let parsed: BackendKind = serde_yaml::from_str("flat_file").unwrap();
        assert_eq!(parsed, BackendKind::FlatFile);
        assert_eq!("flat-file".parse::<BackendKind>().unwrap(), BackendKind::FlatFile);
        assert_eq!("SQLite".parse::<BackendKind>().unwrap(), BackendKind::Sqlite);
        assert!("postgres".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_storage_failure_classification() {
        let io = StoreError::Io(std::io::Error::other("disk"));
        assert!(io.is_storage_failure());
        assert!(!StoreError::NotFound("x".into()).is_storage_failure());
        assert!(!StoreError::ValidationFailure("x".into()).is_storage_failure());
    }
}
