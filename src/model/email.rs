//! Email records
//!
//! One `Email` is one stored copy. Several copies can share a [`MessageId`]:
//! a sent message lives on as the sender's `Sent` copy plus one `Inbox` copy
//! shared by every recipient.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier shared by every stored copy of one logical message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh message ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create from an existing string
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one stored copy, assigned by the store on first persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CopyId(i64);

impl CopyId {
    /// Wrap a raw id (a SQLite row id, or a flat-file sequence number)
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw id
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for CopyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a stored copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailStatus {
    /// Delivered to the recipients
    Inbox,
    /// Filed away by its owner
    Archived,
    /// In the trash, recoverable until purged
    Deleted,
    /// Unsent, owned by its author
    Draft,
    /// The sender's copy of a sent message
    Sent,
}

impl EmailStatus {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Inbox => "INBOX",
            EmailStatus::Archived => "ARCHIVED",
            EmailStatus::Deleted => "DELETED",
            EmailStatus::Draft => "DRAFT",
            EmailStatus::Sent => "SENT",
        }
    }

    /// Parse a storage name; `None` for anything unrecognised
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INBOX" => Some(EmailStatus::Inbox),
            "ARCHIVED" => Some(EmailStatus::Archived),
            "DELETED" => Some(EmailStatus::Deleted),
            "DRAFT" => Some(EmailStatus::Draft),
            "SENT" => Some(EmailStatus::Sent),
            _ => None,
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive address comparison
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// One stored copy of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Copy identity; `None` until the store persists the copy
    #[serde(default)]
    pub id: Option<CopyId>,
    pub message_id: MessageId,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    /// Attachment references (stored names), never the bytes
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Creation instant of this copy in Unix milliseconds
    pub timestamp: i64,
    pub is_read: bool,
    pub status: EmailStatus,
}

impl Email {
    /// Create a new copy stamped with the current time
    ///
    /// Drafts and sent copies start out read; everything else starts unread.
    pub fn new(
        message_id: MessageId,
        from: impl Into<String>,
        to: Vec<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        attachments: Vec<String>,
        status: EmailStatus,
    ) -> Self {
        Self {
            id: None,
            message_id,
            from: from.into(),
            to,
            subject: subject.into(),
            body: body.into(),
            attachments,
            timestamp: Utc::now().timestamp_millis(),
            is_read: matches!(status, EmailStatus::Draft | EmailStatus::Sent),
            status,
        }
    }

    /// Override the creation timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.timestamp_millis();
        self
    }

    /// True iff `address` matches any recipient, ignoring case
    pub fn is_recipient(&self, address: &str) -> bool {
        self.to.iter().any(|addr| same_address(addr, address))
    }

    /// True iff `address` is the sender, ignoring case
    pub fn is_from(&self, address: &str) -> bool {
        same_address(&self.from, address)
    }

    /// Creation instant as a UTC datetime
    pub fn sent_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}
