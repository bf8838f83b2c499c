//! Attachment storage
//!
//! Attachments are copied into an engine-owned directory under a generated
//! name of the form `<token>-<original-filename>`, where the token is a
//! dash-free UUID. That name is the reference handed back to callers and
//! stored on emails.
//!
//! ```text
//! <data_dir>/attachments/
//!   0b7e6c1a5d4f4a579d0c3f1f4f1b2a11-report.pdf
//!   9c2d...-photo.png
//! ```

use super::{Result, StoreError};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Directory-backed attachment storage shared by both backends
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    /// Directory holding the stored files
    base_path: PathBuf,
}

impl AttachmentStore {
    /// Create the store, making the directory if needed
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Copy `source` into storage and return its reference
    ///
    /// # Errors
    /// `ValidationFailure` if `source` is not an existing file, or the copy
    /// error if the bytes could not be written.
    pub fn save(&self, source: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(StoreError::ValidationFailure(format!(
                "attachment source does not exist: {}",
                source.display()
            )));
        }

        let original = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                StoreError::ValidationFailure(format!(
                    "attachment source has no usable file name: {}",
                    source.display()
                ))
            })?;

        let reference = format!("{}-{}", uuid::Uuid::new_v4().simple(), original);
        let dest = self.base_path.join(&reference);

        fs::copy(source, &dest).map_err(|e| {
            tracing::warn!(source = %source.display(), error = %e, "Failed to store attachment");
            StoreError::StorageUnavailable(format!("copying {}: {}", source.display(), e))
        })?;

        tracing::debug!(reference = %reference, "Stored attachment");
        Ok(reference)
    }

    /// Resolve a reference to a stored file, if it exists
    pub fn get(&self, reference: &str) -> Option<PathBuf> {
        if !is_plain_name(reference) {
            return None;
        }
        let path = self.base_path.join(reference);
        path.is_file().then_some(path)
    }

    /// Delete a stored file
    pub fn remove(&self, reference: &str) -> Result<()> {
        let path = self
            .get(reference)
            .ok_or_else(|| StoreError::NotFound(reference.to_string()))?;
        fs::remove_file(path)?;
        tracing::debug!(reference = %reference, "Removed attachment");
        Ok(())
    }
}

/// True iff `reference` names a single file directly inside the directory
fn is_plain_name(reference: &str) -> bool {
    let mut components = Path::new(reference).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Original file name of a stored attachment
///
/// Strips everything up to and including the first `-`. References without a
/// separator are returned unchanged.
pub fn attachment_display_name(reference: &str) -> &str {
    reference
        .split_once('-')
        .map(|(_, rest)| rest)
        .unwrap_or(reference)
}
