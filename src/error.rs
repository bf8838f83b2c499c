//! Error types for Postbox
//!
//! Store failures keep their own enum ([`StoreError`]); everything the mailbox
//! engine, configuration, and CLI can report is collected here.

use crate::model::{CopyId, EmailStatus};
use crate::store::StoreError;
use thiserror::Error;

/// Result type alias for Postbox operations
pub type Result<T> = std::result::Result<T, PostboxError>;

/// Error type for Postbox operations
#[derive(Error, Debug)]
pub enum PostboxError {
    /// Persistence failures
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors outside the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Caller input rejected by a mailbox or account rule
    #[error("{0}")]
    Validation(String),

    /// No account with this address
    #[error("No account found for {0}")]
    UnknownUser(String),

    /// Password did not match
    #[error("Incorrect password for {0}")]
    WrongPassword(String),

    /// Selected email does not exist or is not visible to the user
    #[error("Email not found: {0}")]
    UnknownEmail(CopyId),

    /// Action not allowed from the email's current status
    #[error("Cannot {action} email {id} with status {status}")]
    InvalidTransition {
        id: CopyId,
        status: EmailStatus,
        action: &'static str,
    },

    /// An action was requested on an empty selection
    #[error("Select one or more emails first")]
    EmptySelection,

    /// A profile update changed nothing
    #[error("No changes detected")]
    NoChanges,

    /// Background task failed to complete
    #[error("Background task failed: {0}")]
    Task(String),
}

impl PostboxError {
    /// True when the failure came from durable storage rather than input
    pub fn is_storage_failure(&self) -> bool {
        match self {
            PostboxError::Store(e) => e.is_storage_failure(),
            PostboxError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_message() {
        let err = PostboxError::InvalidTransition {
            id: CopyId::new(7),
            status: EmailStatus::Sent,
            action: "archive",
        };
        assert_eq!(err.to_string(), "Cannot archive email 7 with status SENT");
    }

    #[test]
    fn test_storage_failure_passthrough() {
        let err: PostboxError = StoreError::StorageUnavailable("disk full".into()).into();
        assert!(err.is_storage_failure());
        assert!(!PostboxError::EmptySelection.is_storage_failure());
    }
}
