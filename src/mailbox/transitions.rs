//! Status transitions and read flags
//!
//! ```text
//! INBOX ──archive──▶ ARCHIVED ──trash──▶ DELETED ──purge──▶ (gone)
//!   │                   ▲  │                │
//!   └──────trash────────┼──┼───────────────▶│
//!                       └──┴──restore───────┘──▶ SENT (sender) / INBOX (recipient)
//! ```

use super::Mailbox;
use crate::model::{CopyId, Email, EmailStatus};
use crate::Result;

const ARCHIVABLE: &[EmailStatus] = &[EmailStatus::Inbox];
const TRASHABLE: &[EmailStatus] = &[EmailStatus::Inbox, EmailStatus::Archived];
const RESTORABLE: &[EmailStatus] = &[EmailStatus::Archived, EmailStatus::Deleted];
const PURGEABLE: &[EmailStatus] = &[EmailStatus::Deleted];
const DISCARDABLE: &[EmailStatus] = &[EmailStatus::Draft];
const FLAGGABLE: &[EmailStatus] = &[
    EmailStatus::Inbox,
    EmailStatus::Archived,
    EmailStatus::Deleted,
    EmailStatus::Sent,
];

impl Mailbox {
    /// Move inbox copies to the archive
    pub fn archive(&self, user: &str, ids: &[CopyId]) -> Result<usize> {
        self.update_selected(user, ids, "archive", ARCHIVABLE, |e| {
            e.status = EmailStatus::Archived;
        })
    }

    /// Move inbox or archived copies to the trash
    pub fn trash(&self, user: &str, ids: &[CopyId]) -> Result<usize> {
        self.update_selected(user, ids, "trash", TRASHABLE, |e| {
            e.status = EmailStatus::Deleted;
        })
    }

    /// Bring archived or trashed copies back
    ///
    /// A copy returns to `Sent` when `user` is its sender and to `Inbox`
    /// otherwise.
    pub fn restore(&self, user: &str, ids: &[CopyId]) -> Result<usize> {
        self.update_selected(user, ids, "restore", RESTORABLE, |e| {
            e.status = if e.is_from(user) {
                EmailStatus::Sent
            } else {
                EmailStatus::Inbox
            };
        })
    }

    /// Permanently remove trashed copies
    pub fn purge(&self, user: &str, ids: &[CopyId]) -> Result<usize> {
        self.remove_selected(user, ids, "purge", PURGEABLE)
    }

    /// Permanently remove drafts
    pub fn discard_drafts(&self, user: &str, ids: &[CopyId]) -> Result<usize> {
        self.remove_selected(user, ids, "discard", DISCARDABLE)
    }

    /// Fetch a copy for display, marking it read
    ///
    /// Drafts are returned untouched.
    pub fn open(&self, user: &str, id: CopyId) -> Result<Email> {
        let mut email = self.email(user, id)?;
        if email.status == EmailStatus::Draft || email.is_read {
            return Ok(email);
        }

        self.store.with_emails_mut(&mut |emails: &mut Vec<Email>| {
            if let Some(stored) = emails.iter_mut().find(|e| e.id == Some(id)) {
                stored.is_read = true;
            }
        });
        self.store.save_all()?;

        email.is_read = true;
        Ok(email)
    }

    /// Clear the read flag on the selected copies
    pub fn mark_unread(&self, user: &str, ids: &[CopyId]) -> Result<usize> {
        self.update_selected(user, ids, "mark unread", FLAGGABLE, |e| {
            e.is_read = false;
        })
    }
}
