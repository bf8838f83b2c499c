//! Flat-file mail store
//!
//! Keeps each collection in one file under the data directory:
//!
//! ```text
//! <data_dir>/
//!   users.db        # every User, one serialized document
//!   emails.db       # every stored Email copy, one serialized document
//!   attachments/    # see AttachmentStore
//! ```
//!
//! Every mutation rewrites the whole affected file. Writes land in a temp file
//! next to the target and are renamed over it, so a crash mid-write leaves the
//! previous version intact. Files that are missing, empty, or undecodable load
//! as empty collections. A mutation whose write fails leaves the in-memory
//! collections as they were before it.
//!
//! `emails.db` also records the next copy id, so ids are never reused after
//! the newest copy is purged.

use super::{AttachmentStore, BackendKind, MailStore, Result, StoreError};
use crate::model::{CopyId, Email, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const USERS_FILE: &str = "users.db";
const EMAILS_FILE: &str = "emails.db";
const FORMAT_VERSION: u32 = 1;

/// On-disk document for one collection
#[derive(Debug, Deserialize)]
struct CollectionFile<T> {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    next_id: Option<i64>,
    items: Vec<T>,
}

impl<T> Default for CollectionFile<T> {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            next_id: None,
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CollectionFileRef<'a, T> {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_id: Option<i64>,
    items: &'a [T],
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Default)]
struct Collections {
    users: Vec<User>,
    emails: Vec<Email>,
    /// Next copy id to hand out; only ever grows
    next_id: i64,
}

/// Mail store backed by two serialized collection files
pub struct FlatFileStore {
    users_path: PathBuf,
    emails_path: PathBuf,
    attachments: AttachmentStore,
    /// Guards the collections and all file I/O
    data: Mutex<Collections>,
}

impl FlatFileStore {
    /// Open (or create) a store rooted at `data_dir` and load it
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;

        let store = Self {
            users_path: data_dir.join(USERS_FILE),
            emails_path: data_dir.join(EMAILS_FILE),
            attachments: AttachmentStore::new(data_dir.join("attachments"))?,
            data: Mutex::new(Collections::default()),
        };
        store.reload()?;
        Ok(store)
    }

    fn data(&self) -> MutexGuard<'_, Collections> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_users(&self, data: &Collections) -> Result<()> {
        write_collection(&self.users_path, &data.users, None)
    }

    fn write_emails(&self, data: &Collections) -> Result<()> {
        write_collection(&self.emails_path, &data.emails, Some(data.next_id))
    }
}

impl MailStore for FlatFileStore {
    fn kind(&self) -> BackendKind {
        BackendKind::FlatFile
    }

    fn reload(&self) -> Result<()> {
        let mut data = self.data();
        data.users = load_collection::<User>(&self.users_path).items;

        let emails = load_collection::<Email>(&self.emails_path);
        let past_max = emails
            .items
            .iter()
            .filter_map(|e| e.id)
            .map(CopyId::get)
            .max()
            .unwrap_or(0)
            + 1;
        data.next_id = emails.next_id.unwrap_or(1).max(past_max);
        data.emails = emails.items;

        tracing::info!(
            users = data.users.len(),
            emails = data.emails.len(),
            "Flat-file store loaded"
        );
        Ok(())
    }

    fn save_all(&self) -> Result<()> {
        let data = self.data();
        self.write_emails(&data)?;
        self.write_users(&data)?;
        tracing::debug!("Flat-file store flushed");
        Ok(())
    }

    fn users(&self) -> Vec<User> {
        self.data().users.clone()
    }

    fn add_user(&self, user: User) -> Result<()> {
        let mut data = self.data();
        if data.users.iter().any(|u| u.has_address(&user.email_id)) {
            return Err(StoreError::ValidationFailure(format!(
                "user already exists: {}",
                user.email_id
            )));
        }

        tracing::debug!(email_id = %user.email_id, "Adding user");
        data.users.push(user);
        if let Err(e) = self.write_users(&data) {
            data.users.pop();
            return Err(e);
        }
        Ok(())
    }

    fn update_user(&self, user: &User) -> Result<()> {
        let mut data = self.data();
        let index = data
            .users
            .iter()
            .position(|u| u.has_address(&user.email_id))
            .ok_or_else(|| StoreError::NotFound(user.email_id.clone()))?;

        let previous = data.users[index].clone();
        data.users[index].name = user.name.clone();
        data.users[index].password = user.password.clone();
        tracing::debug!(email_id = %user.email_id, "Updating user");
        if let Err(e) = self.write_users(&data) {
            data.users[index] = previous;
            return Err(e);
        }
        Ok(())
    }

    fn delete_user(&self, user: &User) -> Result<()> {
        let mut data = self.data();
        let users = data.users.clone();
        let emails = data.emails.clone();
        data.users.retain(|u| !u.has_address(&user.email_id));
        data.emails.retain(|e| !e.is_from(&user.email_id));

        if let Err(e) = self.write_emails(&data) {
            data.users = users;
            data.emails = emails;
            return Err(e);
        }
        if let Err(e) = self.write_users(&data) {
            data.users = users;
            data.emails = emails;
            if let Err(restore) = self.write_emails(&data) {
                tracing::warn!(error = %restore, "Failed to restore emails after user write failed");
            }
            return Err(e);
        }

        tracing::info!(
            email_id = %user.email_id,
            removed_emails = emails.len() - data.emails.len(),
            "Deleted user"
        );
        Ok(())
    }

    fn emails(&self) -> Vec<Email> {
        self.data().emails.clone()
    }

    fn add_emails(&self, mut batch: Vec<Email>) -> Result<Vec<Email>> {
        let mut data = self.data();
        let before = data.emails.len();
        let next_id = data.next_id;

        for email in batch.iter_mut() {
            let id = data.next_id;
            data.next_id += 1;
            email.id = Some(CopyId::new(id));
            tracing::debug!(id, message_id = %email.message_id, status = %email.status, "Adding email");
            data.emails.push(email.clone());
        }

        if let Err(e) = self.write_emails(&data) {
            data.emails.truncate(before);
            data.next_id = next_id;
            return Err(e);
        }
        Ok(batch)
    }

    fn with_emails_mut(&self, edit: &mut dyn FnMut(&mut Vec<Email>)) {
        let mut data = self.data();
        edit(&mut data.emails);
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

/// Load one collection, degrading to empty on any problem
fn load_collection<T: DeserializeOwned>(path: &Path) -> CollectionFile<T> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CollectionFile::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read collection, starting empty");
            return CollectionFile::default();
        }
    };

    if content.iter().all(u8::is_ascii_whitespace) {
        return CollectionFile::default();
    }

    match decode_collection(path, &content) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(error = %e, "Discarding unreadable collection");
            CollectionFile::default()
        }
    }
}

fn decode_collection<T: DeserializeOwned>(path: &Path, content: &[u8]) -> Result<CollectionFile<T>> {
    let file: CollectionFile<T> =
        serde_json::from_slice(content).map_err(|e| StoreError::CorruptData {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if file.version != FORMAT_VERSION {
        tracing::warn!(version = file.version, path = %path.display(), "Unknown collection version, attempting to use anyway");
    }
    Ok(file)
}

/// Replace `path` with the serialized collection via temp file and rename
fn write_collection<T: Serialize>(path: &Path, items: &[T], next_id: Option<i64>) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        serde_json::to_writer(
            &mut writer,
            &CollectionFileRef {
                version: FORMAT_VERSION,
                next_id,
                items,
            },
        )?;
        writer.flush()?;
    }
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
