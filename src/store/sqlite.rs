//! SQLite mail store
//!
//! One row per user (`email` is the primary key) and one row per stored email
//! copy. Copies of one message share `messageId`, so rows carry their own
//! autoincrement `id`, which doubles as the copy id.
//!
//! Inserts, updates, and deletes write through immediately. The in-memory
//! cache mirrors the tables and is replaced wholesale by `reload`. `save_all`
//! diffs the email cache against the rows it last saw and issues targeted
//! `UPDATE`/`DELETE` statements by row id, so rows the cache never held (ones
//! that failed to decode, or a load that failed outright) are left untouched.

use super::conversions::{join_list, split_list};
use super::{AttachmentStore, BackendKind, MailStore, Result, StoreError};
use crate::model::{CopyId, Email, EmailStatus, MessageId, User};
use rusqlite::{params, Connection, Row};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const DB_FILE: &str = "mail.db";

struct Inner {
    conn: Connection,
    users: Vec<User>,
    emails: Vec<Email>,
    /// Email rows as last read from or written to the table, by row id
    persisted: HashMap<CopyId, Email>,
}

/// Mail store backed by SQLite tables
pub struct SqliteStore {
    path: PathBuf,
    attachments: AttachmentStore,
    /// Guards the connection and the cache together
    inner: Mutex<Inner>,
}

impl SqliteStore {
    /// Open (or create) the database under `data_dir` and load it
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;

        let path = data_dir.join(DB_FILE);
        tracing::info!(path = %path.display(), "Opening mail database");

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_schema(&conn)?;

        let store = Self {
            path,
            attachments: AttachmentStore::new(data_dir.join("attachments"))?,
            inner: Mutex::new(Inner {
                conn,
                users: Vec::new(),
                emails: Vec::new(),
                persisted: HashMap::new(),
            }),
        };
        store.reload()?;
        Ok(store)
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn snapshot(emails: &[Email]) -> HashMap<CopyId, Email> {
    emails
        .iter()
        .filter_map(|e| e.id.map(|id| (id, e.clone())))
        .collect()
}

/// Create the tables if they do not exist yet
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            name TEXT NOT NULL,
            email TEXT PRIMARY KEY,
            password TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS emails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            messageId TEXT,
            sender TEXT NOT NULL,
            recipients TEXT NOT NULL,
            subject TEXT,
            body TEXT,
            attachments TEXT,
            timestamp INTEGER,
            isRead INTEGER,
            status TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_emails_message ON emails(messageId);
        CREATE INDEX IF NOT EXISTS idx_emails_sender ON emails(sender);
        "#,
    )?;
    Ok(())
}

fn load_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare("SELECT rowid, name, email, password FROM users ORDER BY rowid")?;
    let rows = stmt
        .query_map([], |row| match row_to_user(row) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!(rowid = row.get::<_, i64>(0).ok(), error = %e, "Skipping undecodable user row");
                Ok(None)
            }
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().flatten().collect())
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        name: row.get(1)?,
        email_id: row.get(2)?,
        password: row.get(3)?,
    })
}

fn load_emails(conn: &Connection) -> Result<Vec<Email>> {
    let mut stmt = conn.prepare(
        "SELECT id, messageId, sender, recipients, subject, body, attachments, timestamp, isRead, status
         FROM emails ORDER BY id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(row_to_email(row).unwrap_or_else(|e| {
                tracing::warn!(id = row.get::<_, i64>(0).ok(), error = %e, "Skipping undecodable email row");
                None
            }))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows.into_iter().flatten().collect())
}

/// Decode one row; `None` for rows whose status is not recognised
///
/// Skipped rows stay in the table untouched.
fn row_to_email(row: &Row<'_>) -> rusqlite::Result<Option<Email>> {
    let id: i64 = row.get(0)?;
    let status: Option<String> = row.get(9)?;
    let Some(status) = status.as_deref().and_then(EmailStatus::parse) else {
        tracing::warn!(id, status = ?status, "Skipping email row with unknown status");
        return Ok(None);
    };

    let recipients: Option<String> = row.get(3)?;
    let attachments: Option<String> = row.get(6)?;

    Ok(Some(Email {
        id: Some(CopyId::new(id)),
        message_id: MessageId::from_string(row.get::<_, Option<String>>(1)?.unwrap_or_default()),
        from: row.get(2)?,
        to: split_list(recipients.as_deref()),
        subject: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        body: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        attachments: split_list(attachments.as_deref()),
        timestamp: row.get::<_, Option<i64>>(7)?.unwrap_or_default(),
        is_read: row.get::<_, Option<i64>>(8)?.unwrap_or_default() == 1,
        status,
    }))
}

/// Insert one email row, keeping its id when it already has one
fn insert_email(conn: &Connection, email: &Email) -> Result<CopyId> {
    conn.execute(
        "INSERT INTO emails (id, messageId, sender, recipients, subject, body, attachments, timestamp, isRead, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            email.id.map(CopyId::get),
            email.message_id.as_str(),
            &email.from,
            join_list(&email.to),
            &email.subject,
            &email.body,
            join_list(&email.attachments),
            email.timestamp,
            i64::from(email.is_read),
            email.status.as_str(),
        ],
    )?;
    Ok(CopyId::new(conn.last_insert_rowid()))
}

/// Rewrite every column of an existing row
fn update_email(conn: &Connection, id: CopyId, email: &Email) -> Result<()> {
    conn.execute(
        "UPDATE emails SET messageId = ?, sender = ?, recipients = ?, subject = ?, body = ?,
                attachments = ?, timestamp = ?, isRead = ?, status = ?
         WHERE id = ?",
        params![
            email.message_id.as_str(),
            &email.from,
            join_list(&email.to),
            &email.subject,
            &email.body,
            join_list(&email.attachments),
            email.timestamp,
            i64::from(email.is_read),
            email.status.as_str(),
            id.get(),
        ],
    )?;
    Ok(())
}

fn insert_user(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (name, email, password) VALUES (?, ?, ?)",
        params![&user.name, &user.email_id, &user.password],
    )?;
    Ok(())
}

impl MailStore for SqliteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn reload(&self) -> Result<()> {
        let mut inner = self.inner();

        let loaded = load_users(&inner.conn)
            .and_then(|users| load_emails(&inner.conn).map(|emails| (users, emails)));
        let (users, emails) = loaded.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load mail database, starting empty");
            (Vec::new(), Vec::new())
        });

        tracing::info!(users = users.len(), emails = emails.len(), "SQLite store loaded");
        inner.persisted = snapshot(&emails);
        inner.users = users;
        inner.emails = emails;
        Ok(())
    }

    fn save_all(&self) -> Result<()> {
        let mut guard = self.inner();
        let Inner {
            conn,
            emails,
            persisted,
            ..
        } = &mut *guard;

        let tx = conn.transaction()?;
        let mut live = HashSet::new();
        let mut assigned = Vec::new();
        let mut updated = 0usize;

        for (index, email) in emails.iter().enumerate() {
            match email.id {
                Some(id) => {
                    live.insert(id);
                    match persisted.get(&id) {
                        Some(previous) if previous == email => {}
                        Some(_) => {
                            update_email(&tx, id, email)?;
                            updated += 1;
                        }
                        None => {
                            insert_email(&tx, email)?;
                        }
                    }
                }
                None => assigned.push((index, insert_email(&tx, email)?)),
            }
        }

        let removed: Vec<CopyId> = persisted
            .keys()
            .filter(|id| !live.contains(*id))
            .copied()
            .collect();
        for id in &removed {
            tx.execute("DELETE FROM emails WHERE id = ?", params![id.get()])?;
        }

        tx.commit()?;

        for (index, id) in assigned {
            emails[index].id = Some(id);
        }
        *persisted = snapshot(emails);

        tracing::debug!(updated, removed = removed.len(), "SQLite store flushed");
        Ok(())
    }

    fn users(&self) -> Vec<User> {
        self.inner().users.clone()
    }

    fn add_user(&self, user: User) -> Result<()> {
        let mut inner = self.inner();
        if inner.users.iter().any(|u| u.has_address(&user.email_id)) {
            return Err(StoreError::ValidationFailure(format!(
                "user already exists: {}",
                user.email_id
            )));
        }

        insert_user(&inner.conn, &user)?;
        tracing::debug!(email_id = %user.email_id, "Added user");
        inner.users.push(user);
        Ok(())
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let mut guard = self.inner();
        let Inner { conn, users, .. } = &mut *guard;

        let existing = users
            .iter_mut()
            .find(|u| u.has_address(&user.email_id))
            .ok_or_else(|| StoreError::NotFound(user.email_id.clone()))?;

        conn.execute(
            "UPDATE users SET name = ?, password = ? WHERE email = ?",
            params![&user.name, &user.password, &existing.email_id],
        )?;

        existing.name = user.name.clone();
        existing.password = user.password.clone();
        tracing::debug!(email_id = %user.email_id, "Updated user");
        Ok(())
    }

    fn delete_user(&self, user: &User) -> Result<()> {
        let mut guard = self.inner();
        let Inner {
            conn,
            users,
            emails,
            persisted,
        } = &mut *guard;

        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM users WHERE email = ? COLLATE NOCASE",
            params![&user.email_id],
        )?;
        let removed = tx.execute(
            "DELETE FROM emails WHERE sender = ? COLLATE NOCASE",
            params![&user.email_id],
        )?;
        tx.commit()?;

        users.retain(|u| !u.has_address(&user.email_id));
        emails.retain(|e| !e.is_from(&user.email_id));
        persisted.retain(|_, e| !e.is_from(&user.email_id));

        tracing::info!(email_id = %user.email_id, removed_emails = removed, "Deleted user");
        Ok(())
    }

    fn emails(&self) -> Vec<Email> {
        self.inner().emails.clone()
    }

    fn add_emails(&self, mut batch: Vec<Email>) -> Result<Vec<Email>> {
        let mut guard = self.inner();
        let Inner {
            conn,
            emails,
            persisted,
            ..
        } = &mut *guard;

        let tx = conn.transaction()?;
        let mut ids = Vec::with_capacity(batch.len());
        for email in batch.iter_mut() {
            email.id = None;
            ids.push(insert_email(&tx, email)?);
        }
        tx.commit()?;

        for (email, id) in batch.iter_mut().zip(ids) {
            email.id = Some(id);
            tracing::debug!(id = %id, message_id = %email.message_id, status = %email.status, "Added email");
            persisted.insert(id, email.clone());
            emails.push(email.clone());
        }
        Ok(batch)
    }

    fn with_emails_mut(&self, edit: &mut dyn FnMut(&mut Vec<Email>)) {
        let mut inner = self.inner();
        edit(&mut inner.emails);
    }

    fn save_attachment(&self, source: &Path) -> Result<String> {
        self.attachments.save(source)
    }

    fn remove_attachment(&self, reference: &str) -> Result<()> {
        self.attachments.remove(reference)
    }

    fn attachment(&self, reference: &str) -> Option<PathBuf> {
        self.attachments.get(reference)
    }
}
