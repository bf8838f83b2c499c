//! Deleting sent mail, with unsend
//!
//! A sender deleting copies from their Sent view gets two batches:
//!
//! - **plain delete**: copies at least one unsend window old; only the
//!   sender's copy goes
//! - **unsend**: younger copies; the sender's copy goes together with every
//!   `Inbox` copy sharing its message id, so recipients lose it too
//!
//! The selection is partitioned before anything changes. Each non-empty batch
//! is confirmed on its own and applied in one edit, so a declined batch leaves
//! state untouched. One `save_all` flushes the net result.

use super::{check_selection, dedup, is_selected, Mailbox};
use crate::model::{CopyId, Email, EmailStatus, MessageId};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::Duration;

/// Sent copies younger than this are unsent rather than deleted
pub const DEFAULT_UNSEND_WINDOW: Duration = Duration::from_secs(60);

/// Which half of a delete request a prompt is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBatch {
    PlainDelete,
    Unsend,
}

/// Confirmation request for one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePrompt {
    pub batch: DeleteBatch,
    pub count: usize,
    pub window: Duration,
}

impl fmt::Display for DeletePrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.batch {
            DeleteBatch::PlainDelete => write!(
                f,
                "Permanently delete {} email(s)? This only removes your copy.",
                self.count
            ),
            DeleteBatch::Unsend => write!(
                f,
                "{} email(s) are less than {} seconds old. Unsend them? This deletes them for ALL recipients.",
                self.count,
                self.window.as_secs()
            ),
        }
    }
}

/// Answers delete prompts
pub trait Confirm {
    fn confirm(&mut self, prompt: &DeletePrompt) -> bool;
}

impl<F> Confirm for F
where
    F: FnMut(&DeletePrompt) -> bool,
{
    fn confirm(&mut self, prompt: &DeletePrompt) -> bool {
        self(prompt)
    }
}

/// A sent-mail selection split by age
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletePlan {
    pub plain_delete: Vec<CopyId>,
    pub unsend: Vec<CopyId>,
}

impl DeletePlan {
    /// Split `selected` copies: elapsed time under `window` means unsend
    pub fn partition<'a>(
        selected: impl IntoIterator<Item = &'a Email>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Self {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        let now_ms = now.timestamp_millis();

        let mut plan = DeletePlan::default();
        for email in selected {
            let Some(id) = email.id else { continue };
            if now_ms.saturating_sub(email.timestamp) < window_ms {
                plan.unsend.push(id);
            } else {
                plan.plain_delete.push(id);
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.plain_delete.is_empty() && self.unsend.is_empty()
    }
}

/// What a delete request ended up doing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Sender copies removed by plain delete
    pub deleted: usize,
    /// Sender copies removed by unsend
    pub unsent: usize,
    /// Recipient `Inbox` copies removed alongside unsent messages
    pub recalled: usize,
    /// Batches the user said no to
    pub declined: Vec<DeleteBatch>,
}

impl Mailbox {
    /// Validate a Sent-view selection and split it by age
    pub fn plan_delete_sent(&self, user: &str, ids: &[CopyId], now: DateTime<Utc>) -> Result<DeletePlan> {
        let selection = dedup(ids)?;
        let emails = self.store.emails();
        check_selection(&emails, user, &selection, "delete", &[EmailStatus::Sent])?;

        Ok(DeletePlan::partition(
            emails.iter().filter(|e| is_selected(e, &selection)),
            now,
            self.rules.unsend_window,
        ))
    }

    /// Delete sent copies, unsending those still inside the window
    pub fn delete_sent(
        &self,
        user: &str,
        ids: &[CopyId],
        now: DateTime<Utc>,
        confirm: &mut dyn Confirm,
    ) -> Result<DeleteOutcome> {
        let plan = self.plan_delete_sent(user, ids, now)?;
        let mut outcome = DeleteOutcome::default();

        if !plan.plain_delete.is_empty() {
            let prompt = self.prompt(DeleteBatch::PlainDelete, plan.plain_delete.len());
            if confirm.confirm(&prompt) {
                let selection: BTreeSet<CopyId> = plan.plain_delete.iter().copied().collect();
                self.store.with_emails_mut(&mut |emails: &mut Vec<Email>| {
                    let before = emails.len();
                    emails.retain(|e| !is_selected(e, &selection));
                    outcome.deleted = before - emails.len();
                });
            } else {
                outcome.declined.push(DeleteBatch::PlainDelete);
            }
        }

        if !plan.unsend.is_empty() {
            let prompt = self.prompt(DeleteBatch::Unsend, plan.unsend.len());
            if confirm.confirm(&prompt) {
                let selection: BTreeSet<CopyId> = plan.unsend.iter().copied().collect();
                self.store.with_emails_mut(&mut |emails: &mut Vec<Email>| {
                    let (unsent, recalled) = unsend(emails, &selection);
                    outcome.unsent = unsent;
                    outcome.recalled = recalled;
                });
            } else {
                outcome.declined.push(DeleteBatch::Unsend);
            }
        }

        self.store.save_all()?;
        tracing::info!(
            user,
            deleted = outcome.deleted,
            unsent = outcome.unsent,
            recalled = outcome.recalled,
            "Deleted sent emails"
        );
        Ok(outcome)
    }

    fn prompt(&self, batch: DeleteBatch, count: usize) -> DeletePrompt {
        DeletePrompt {
            batch,
            count,
            window: self.rules.unsend_window,
        }
    }
}

/// Remove the selected copies and every `Inbox` copy of the same messages
///
/// Returns (selected copies removed, inbox copies removed).
fn unsend(emails: &mut Vec<Email>, selection: &BTreeSet<CopyId>) -> (usize, usize) {
    let messages: HashSet<MessageId> = emails
        .iter()
        .filter(|e| is_selected(e, selection))
        .map(|e| e.message_id.clone())
        .collect();

    let mut unsent = 0;
    let mut recalled = 0;
    emails.retain(|e| {
        if is_selected(e, selection) {
            unsent += 1;
            false
        } else if e.status == EmailStatus::Inbox && messages.contains(&e.message_id) {
            recalled += 1;
            false
        } else {
            true
        }
    });
    (unsent, recalled)
}
