//! The relay's persisted document.

use crate::error::RelayResult;
use drawsync_core::Document;
use drawsync_core::storage::{FileStorage, Storage};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One persisted document that every sync is merged into.
///
/// Merges are serialized, so concurrent syncs never lose each other's shapes.
pub struct RelayStore {
    storage: Arc<dyn Storage>,
    key: String,
    lock: Mutex<()>,
}

impl RelayStore {
    /// Open the document stored under `key`, creating an empty one if absent.
    pub async fn open(storage: Arc<dyn Storage>, key: impl Into<String>) -> RelayResult<Self> {
        let key = key.into();
        if !storage.exists(&key).await? {
            info!(key = %key, "Initializing empty relay snapshot");
            storage.save(&key, &Document::new()).await?;
        }
        Ok(Self {
            storage,
            key,
            lock: Mutex::new(()),
        })
    }

    /// Open a snapshot file. Its directory becomes the storage root and its
    /// stem the key.
    pub async fn open_file(path: &Path) -> RelayResult<Self> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => Path::new(".").to_path_buf(),
        };
        let key = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "relay_snapshot".to_string());

        let storage = FileStorage::new(dir)?;
        info!(path = %storage.document_path(&key).display(), "Using relay snapshot");
        Self::open(Arc::new(storage), key).await
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Merge `incoming` after the stored shapes, persist, and return the result.
    ///
    /// A missing or unreadable snapshot fails the merge instead of starting
    /// over from an empty document.
    pub async fn merge_incoming(&self, incoming: &Document) -> RelayResult<Document> {
        let _guard = self.lock.lock().await;
        let mut stored = self.storage.load(&self.key).await?;
        let before = stored.len();
        stored.merge(incoming);
        self.storage.save(&self.key, &stored).await?;
        debug!(before, added = incoming.len(), "Merged into relay snapshot");
        Ok(stored)
    }

    /// Current persisted document.
    pub async fn snapshot(&self) -> RelayResult<Document> {
        let _guard = self.lock.lock().await;
        Ok(self.storage.load(&self.key).await?)
    }
}
