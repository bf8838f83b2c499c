//! Mailbox views
//!
//! A view is a pure filter over the stored copies relative to one user. Views
//! never overlap: each status belongs to exactly one view, and the user's role
//! (recipient or sender) decides whether the copy shows up at all.

use super::Mailbox;
use crate::model::{Email, EmailStatus};
use std::fmt;
use std::str::FromStr;

/// Named filter over the email collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Inbox,
    Drafts,
    Sent,
    Archive,
    Trash,
}

impl View {
    /// All views, in sidebar order
    pub const ALL: [View; 5] = [
        View::Inbox,
        View::Drafts,
        View::Sent,
        View::Archive,
        View::Trash,
    ];

    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Inbox => "inbox",
            View::Drafts => "drafts",
            View::Sent => "sent",
            View::Archive => "archive",
            View::Trash => "trash",
        }
    }

    /// True iff `email` belongs in this view for `user`
    pub fn matches(&self, email: &Email, user: &str) -> bool {
        let recipient = email.is_recipient(user);
        let sender = email.is_from(user);

        match self {
            View::Inbox => recipient && email.status == EmailStatus::Inbox,
            View::Drafts => sender && email.status == EmailStatus::Draft,
            View::Sent => sender && email.status == EmailStatus::Sent,
            View::Archive => (recipient || sender) && email.status == EmailStatus::Archived,
            View::Trash => (recipient || sender) && email.status == EmailStatus::Deleted,
        }
    }

    /// The view `email` appears in for `user`, if any
    pub fn classify(email: &Email, user: &str) -> Option<View> {
        View::ALL.into_iter().find(|view| view.matches(email, user))
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbox" => Ok(View::Inbox),
            "drafts" | "draft" => Ok(View::Drafts),
            "sent" => Ok(View::Sent),
            "archive" | "archived" => Ok(View::Archive),
            "trash" | "deleted" => Ok(View::Trash),
            other => Err(format!(
                "unknown view '{}', expected one of: inbox, drafts, sent, archive, trash",
                other
            )),
        }
    }
}

impl Mailbox {
    /// Copies in `view` for `user`, newest first
    pub fn list(&self, user: &str, view: View) -> Vec<Email> {
        let mut emails: Vec<Email> = self
            .store
            .emails()
            .into_iter()
            .filter(|e| view.matches(e, user))
            .collect();
        emails.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        emails
    }

    /// Unread copies in the user's inbox
    pub fn unread_count(&self, user: &str) -> usize {
        self.store
            .emails()
            .iter()
            .filter(|e| View::Inbox.matches(e, user) && !e.is_read)
            .count()
    }
}
