//! Sending and drafting
//!
//! Sending writes two copies that share one message id: an `Inbox` copy for
//! the recipients and a `Sent` copy for the sender. Both are stored as one
//! unit, so a failed send leaves neither behind. Sending a draft reuses the
//! draft's message id and removes the draft record.
//!
//! Replies and forwards start from an existing email: the subject gains a
//! `Re: ` or `Fwd: ` prefix (never twice) and the original body is quoted
//! under a short header. Forwards keep the original's stored attachments by
//! reference.

use super::Mailbox;
use crate::model::{CopyId, Email, EmailStatus, MessageId};
use crate::{PostboxError, Result};
use chrono::Local;
use std::path::PathBuf;

const REPLY_PREFIX: &str = "Re: ";
const FORWARD_PREFIX: &str = "Fwd: ";

/// Where an attachment on a compose comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Already in engine storage (e.g. kept from a draft)
    Stored(String),
    /// External file to copy in on send or save
    File(PathBuf),
}

/// Content of a message being written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compose {
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<AttachmentSource>,
}

impl Compose {
    /// Create a compose; recipients, subject, and body are trimmed
    pub fn new(to: Vec<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            subject: subject.into().trim().to_string(),
            body: body.into().trim().to_string(),
            attachments: Vec::new(),
        }
    }

    /// Attach an external file
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(AttachmentSource::File(path.into()));
        self
    }

    /// Keep an attachment that is already stored
    pub fn with_stored(mut self, reference: impl Into<String>) -> Self {
        self.attachments
            .push(AttachmentSource::Stored(reference.into()));
        self
    }

    /// Reply to `original`, addressed to its sender
    pub fn reply_to(original: &Email) -> Self {
        let header = format!(
            "---- On {}, {} wrote: ----",
            quote_date(original),
            original.from
        );
        Self {
            to: vec![original.from.clone()],
            subject: with_prefix(REPLY_PREFIX, &original.subject),
            body: format!("{}\n{}", header, quote_lines(&original.body)),
            attachments: Vec::new(),
        }
    }

    /// Forward `original`, keeping its attachments; recipients start empty
    pub fn forward(original: &Email) -> Self {
        let header = format!(
            "---- Forwarded Message ----\nFrom: {}\nDate: {}\nSubject: {}\nTo: {}\n",
            original.from,
            quote_date(original),
            original.subject,
            original.to.join(", ")
        );
        Self {
            to: Vec::new(),
            subject: with_prefix(FORWARD_PREFIX, &original.subject),
            body: format!("{}\n{}", header, quote_lines(&original.body)),
            attachments: original
                .attachments
                .iter()
                .cloned()
                .map(AttachmentSource::Stored)
                .collect(),
        }
    }

    /// Replace the recipients
    pub fn with_recipients(mut self, to: Vec<String>) -> Self {
        self.to = Compose::new(to, "", "").to;
        self
    }

    /// Put the writer's own text above the quoted original
    pub fn with_note(mut self, note: &str) -> Self {
        let note = note.trim();
        if !note.is_empty() {
            self.body = format!("{}\n\n{}", note, self.body);
        }
        self
    }

    fn is_empty(&self) -> bool {
        self.to.is_empty()
            && self.subject.is_empty()
            && self.body.is_empty()
            && self.attachments.is_empty()
    }
}

fn with_prefix(prefix: &str, subject: &str) -> String {
    if subject.starts_with(prefix) {
        subject.to_string()
    } else {
        format!("{}{}", prefix, subject)
    }
}

fn quote_lines(body: &str) -> String {
    body.split('\n')
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn quote_date(email: &Email) -> String {
    email.sent_at().with_timezone(&Local).format("%b %-d, %H:%M").to_string()
}

/// Split a comma-separated recipient field into trimmed addresses
pub fn parse_recipients(field: &str) -> Vec<String> {
    field
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Mailbox {
    /// Send a message, optionally from an existing draft
    ///
    /// Returns the message id shared by the two new copies.
    pub fn send(&self, sender: &str, compose: Compose, draft: Option<CopyId>) -> Result<MessageId> {
        let sender = self.registered_address(sender)?;
        self.check_sendable(&sender, &compose)?;

        let message_id = match draft {
            Some(id) => self.own_draft(&sender, id, "send")?.message_id,
            None => MessageId::new(),
        };
        let (attachments, copied) = self.store_attachments(&compose.attachments)?;

        let recipient_copy = Email::new(
            message_id.clone(),
            sender.clone(),
            compose.to.clone(),
            compose.subject.clone(),
            compose.body.clone(),
            attachments.clone(),
            EmailStatus::Inbox,
        );
        let sender_copy = Email::new(
            message_id.clone(),
            sender.clone(),
            compose.to,
            compose.subject,
            compose.body,
            attachments,
            EmailStatus::Sent,
        );
        if let Err(e) = self.store.add_emails(vec![recipient_copy, sender_copy]) {
            self.discard_attachments(&copied);
            return Err(e.into());
        }

        if let Some(id) = draft {
            self.store
                .with_emails_mut(&mut |emails: &mut Vec<Email>| emails.retain(|e| e.id != Some(id)));
        }
        self.store.save_all()?;

        tracing::info!(from = %sender, message_id = %message_id, "Sent email");
        Ok(message_id)
    }

    /// Save a new draft, or rewrite an existing one in place
    pub fn save_draft(&self, sender: &str, compose: Compose, draft: Option<CopyId>) -> Result<CopyId> {
        let sender = self.registered_address(sender)?;
        if compose.is_empty() {
            return Err(PostboxError::Validation(
                "Cannot save an empty draft".to_string(),
            ));
        }

        if let Some(id) = draft {
            self.own_draft(&sender, id, "edit")?;
        }
        let (attachments, copied) = self.store_attachments(&compose.attachments)?;

        let id = match draft {
            Some(id) => {
                self.store.with_emails_mut(&mut |emails: &mut Vec<Email>| {
                    if let Some(existing) = emails.iter_mut().find(|e| e.id == Some(id)) {
                        existing.to = compose.to.clone();
                        existing.subject = compose.subject.clone();
                        existing.body = compose.body.clone();
                        existing.attachments = attachments.clone();
                        existing.status = EmailStatus::Draft;
                        existing.is_read = true;
                    }
                });
                id
            }
            None => {
                let new_draft = Email::new(
                    MessageId::new(),
                    sender.clone(),
                    compose.to,
                    compose.subject,
                    compose.body,
                    attachments,
                    EmailStatus::Draft,
                );
                let stored = match self.store.add_email(new_draft) {
                    Ok(stored) => stored,
                    Err(e) => {
                        self.discard_attachments(&copied);
                        return Err(e.into());
                    }
                };
                stored.id.ok_or_else(|| {
                    PostboxError::Validation("store did not assign an id".to_string())
                })?
            }
        };
        self.store.save_all()?;

        tracing::debug!(from = %sender, id = %id, "Saved draft");
        Ok(id)
    }

    /// Address of a registered user, in its stored spelling
    fn registered_address(&self, address: &str) -> Result<String> {
        self.store
            .users()
            .into_iter()
            .find(|u| u.has_address(address))
            .map(|u| u.email_id)
            .ok_or_else(|| PostboxError::UnknownUser(address.to_string()))
    }

    fn check_sendable(&self, sender: &str, compose: &Compose) -> Result<()> {
        if compose.to.is_empty() {
            return Err(PostboxError::Validation(
                "Please enter at least one recipient".to_string(),
            ));
        }
        if compose.subject.is_empty() {
            return Err(PostboxError::Validation("Subject is required".to_string()));
        }
        if compose.body.is_empty() && compose.attachments.is_empty() {
            return Err(PostboxError::Validation(
                "Please add a message body or an attachment".to_string(),
            ));
        }

        let users = self.store.users();
        for recipient in &compose.to {
            if crate::model::same_address(recipient, sender) {
                return Err(PostboxError::Validation(
                    "You cannot send an email to yourself".to_string(),
                ));
            }
            if !self.in_domain(recipient) {
                return Err(PostboxError::Validation(format!(
                    "Recipient '{}' must use the {} domain",
                    recipient, self.rules.domain
                )));
            }
            if !users.iter().any(|u| u.has_address(recipient)) {
                return Err(PostboxError::Validation(format!(
                    "Recipient email address '{}' not found",
                    recipient
                )));
            }
        }
        Ok(())
    }

    /// True iff `address` carries the configured domain suffix
    pub(super) fn in_domain(&self, address: &str) -> bool {
        let domain = &self.rules.domain;
        if domain.is_empty() {
            return !address.is_empty();
        }
        address.len() > domain.len()
            && address
                .get(address.len() - domain.len()..)
                .is_some_and(|suffix| suffix.eq_ignore_ascii_case(domain))
    }

    fn own_draft(&self, sender: &str, id: CopyId, action: &'static str) -> Result<Email> {
        let email = self.email(sender, id)?;
        if email.status != EmailStatus::Draft || !email.is_from(sender) {
            return Err(PostboxError::InvalidTransition {
                id,
                status: email.status,
                action,
            });
        }
        Ok(email)
    }

    /// References for every source, and the subset copied in by this call
    fn store_attachments(&self, sources: &[AttachmentSource]) -> Result<(Vec<String>, Vec<String>)> {
        let mut references = Vec::with_capacity(sources.len());
        let mut copied = Vec::new();
        for source in sources {
            match source {
                AttachmentSource::Stored(reference) => references.push(reference.clone()),
                AttachmentSource::File(path) => match self.store.save_attachment(path) {
                    Ok(reference) => {
                        copied.push(reference.clone());
                        references.push(reference);
                    }
                    Err(e) => {
                        self.discard_attachments(&copied);
                        return Err(e.into());
                    }
                },
            }
        }
        Ok((references, copied))
    }

    fn discard_attachments(&self, references: &[String]) {
        for reference in references {
            if let Err(e) = self.store.remove_attachment(reference) {
                tracing::warn!(reference = %reference, error = %e, "Failed to remove unused attachment");
            }
        }
    }
}
