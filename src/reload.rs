//! Background reload
//!
//! Re-reading the store touches the disk, so it runs on the blocking pool and
//! never on the caller's thread. The store lock keeps it from interleaving
//! with a concurrent save.

use crate::store::MailStore;
use crate::{PostboxError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Start a reload of `store` on the blocking pool
pub fn spawn_reload(store: Arc<dyn MailStore>) -> JoinHandle<Result<()>> {
    tokio::task::spawn_blocking(move || {
        tracing::debug!(backend = %store.kind(), "Reloading store in background");
        store.reload()?;
        tracing::info!(
            backend = %store.kind(),
            users = store.users().len(),
            emails = store.emails().len(),
            "Store reloaded"
        );
        Ok(())
    })
}

/// Reload `store` off-thread and wait for it
pub async fn reload_in_background(store: Arc<dyn MailStore>) -> Result<()> {
    spawn_reload(store)
        .await
        .map_err(|e| PostboxError::Task(format!("reload task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::User;
    use crate::store::{self, BackendKind};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reload_picks_up_other_writer() {
        let temp_dir = TempDir::new().unwrap();
        let reader = store::open(BackendKind::Sqlite, temp_dir.path()).unwrap();
        let writer = store::open(BackendKind::Sqlite, temp_dir.path()).unwrap();

        writer
            .add_user(User::new("Alice", "alice@mail.cm", "secret1"))
            .unwrap();
        assert!(reader.users().is_empty());

        reload_in_background(reader.clone()).await.unwrap();
        assert_eq!(reader.users().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_of_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = store::open(BackendKind::FlatFile, temp_dir.path()).unwrap();
        spawn_reload(store.clone()).await.unwrap().unwrap();
        assert!(store.emails().is_empty());
    }
}
