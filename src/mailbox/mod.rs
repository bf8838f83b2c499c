//! Mailbox engine
//!
//! Drives every user-facing operation on top of a [`MailStore`]:
//!
//! - **views**: inbox, drafts, sent, archive, and trash as filters over the
//!   stored copies
//! - **compose**: sending and drafting
//! - **transitions**: archive, trash, restore, purge, read flags
//! - **unsend**: time-windowed deletion of sent mail
//! - **accounts**: registration, sign-in, profile changes, account removal
//!
//! Each operation validates its whole selection before touching anything,
//! applies the change in one edit of the store's live collection, and then
//! flushes with `save_all`.

mod account;
mod compose;
mod transitions;
mod unsend;
mod view;

pub use compose::{parse_recipients, AttachmentSource, Compose};
pub use unsend::{Confirm, DeleteBatch, DeleteOutcome, DeletePlan, DeletePrompt};
pub use view::View;

use crate::config::PostboxConfig;
use crate::model::{CopyId, Email, EmailStatus};
use crate::store::MailStore;
use crate::{PostboxError, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Rules the engine enforces on input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxRules {
    /// Required address suffix; empty disables the check
    pub domain: String,
    /// Sent copies younger than this are unsent on delete
    pub unsend_window: Duration,
    /// Minimum password length
    pub min_password_len: usize,
}

impl Default for MailboxRules {
    fn default() -> Self {
        Self {
            domain: "@mail.cm".to_string(),
            unsend_window: unsend::DEFAULT_UNSEND_WINDOW,
            min_password_len: 6,
        }
    }
}

impl From<&PostboxConfig> for MailboxRules {
    fn from(config: &PostboxConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            unsend_window: config.unsend_window(),
            min_password_len: config.min_password_len,
        }
    }
}

/// The mailbox engine over one active store
pub struct Mailbox {
    store: Arc<dyn MailStore>,
    rules: MailboxRules,
}

impl Mailbox {
    /// Create an engine over `store` with the given rules
    pub fn new(store: Arc<dyn MailStore>, rules: MailboxRules) -> Self {
        Self { store, rules }
    }

    /// Create an engine configured from a loaded configuration
    pub fn from_config(store: Arc<dyn MailStore>, config: &PostboxConfig) -> Self {
        Self::new(store, MailboxRules::from(config))
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn MailStore> {
        &self.store
    }

    /// Copy of one stored email visible to `user`
    pub fn email(&self, user: &str, id: CopyId) -> Result<Email> {
        self.store
            .emails()
            .into_iter()
            .find(|e| e.id == Some(id) && View::classify(e, user).is_some())
            .ok_or(PostboxError::UnknownEmail(id))
    }

    /// Apply `change` to every selected copy after validating the selection
    fn update_selected(
        &self,
        user: &str,
        ids: &[CopyId],
        action: &'static str,
        allowed: &[EmailStatus],
        change: impl Fn(&mut Email),
    ) -> Result<usize> {
        let selection = dedup(ids)?;
        let mut outcome = Ok(0);

        self.store.with_emails_mut(&mut |emails: &mut Vec<Email>| {
            outcome = check_selection(emails, user, &selection, action, allowed).map(|()| {
                emails
                    .iter_mut()
                    .filter(|e| is_selected(e, &selection))
                    .for_each(&change);
                selection.len()
            });
        });

        let changed = outcome?;
        tracing::debug!(user, action, changed, "Applied transition");
        self.store.save_all()?;
        Ok(changed)
    }

    /// Remove every selected copy after validating the selection
    fn remove_selected(
        &self,
        user: &str,
        ids: &[CopyId],
        action: &'static str,
        allowed: &[EmailStatus],
    ) -> Result<usize> {
        let selection = dedup(ids)?;
        let mut outcome = Ok(0);

        self.store.with_emails_mut(&mut |emails: &mut Vec<Email>| {
            outcome = check_selection(emails, user, &selection, action, allowed).map(|()| {
                let before = emails.len();
                emails.retain(|e| !is_selected(e, &selection));
                before - emails.len()
            });
        });

        let removed = outcome?;
        tracing::debug!(user, action, removed, "Removed emails");
        self.store.save_all()?;
        Ok(removed)
    }
}

fn dedup(ids: &[CopyId]) -> Result<BTreeSet<CopyId>> {
    if ids.is_empty() {
        return Err(PostboxError::EmptySelection);
    }
    Ok(ids.iter().copied().collect())
}

fn is_selected(email: &Email, selection: &BTreeSet<CopyId>) -> bool {
    email.id.is_some_and(|id| selection.contains(&id))
}

/// Every selected id must name a copy the user can see, in an allowed status
fn check_selection(
    emails: &[Email],
    user: &str,
    selection: &BTreeSet<CopyId>,
    action: &'static str,
    allowed: &[EmailStatus],
) -> Result<()> {
    for &id in selection {
        let email = emails
            .iter()
            .find(|e| e.id == Some(id) && View::classify(e, user).is_some())
            .ok_or(PostboxError::UnknownEmail(id))?;

        if !allowed.contains(&email.status) {
            return Err(PostboxError::InvalidTransition {
                id,
                status: email.status,
                action,
            });
        }
    }
    Ok(())
}
