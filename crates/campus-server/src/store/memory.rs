//! [`MemoryStore`]: in-process document store with optional JSON snapshot.
//!
//! When a snapshot path is configured, every mutation is written through to
//! disk before it becomes visible, and the file is reloaded on startup.
//!
//! Writes run to completion on their own task even if the caller gives up,
//! so a timed-out write may still be applied, in memory and on disk alike.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Collection, Document, DocumentUpdate, RecordStore, StoreError};

/// On-disk and in-memory layout of both collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    students: Vec<Document>,
    #[serde(default)]
    admins: Vec<Document>,
}

impl Collections {
    fn docs(&self, collection: Collection) -> &Vec<Document> {
        match collection {
            Collection::Students => &self.students,
            Collection::Admins => &self.admins,
        }
    }

    fn docs_mut(&mut self, collection: Collection) -> &mut Vec<Document> {
        match collection {
            Collection::Students => &mut self.students,
            Collection::Admins => &mut self.admins,
        }
    }
}

/// Thread-safe document store.
///
/// Wraps an `Arc<RwLock<_>>` so that request handlers can read concurrently
/// while a writer holds the lock only for the length of one document write
/// (plus the snapshot flush, when enabled).
#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
    snapshot: Option<Arc<PathBuf>>,
}

impl MemoryStore {
    /// Create a new, empty, non-persistent [`MemoryStore`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Collections::default())),
            snapshot: None,
        }
    }

    /// Open a store backed by the snapshot file at `path`.
    ///
    /// A missing file starts an empty store; the file is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let collections = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Collections>(&bytes)
                .with_context(|| format!("failed to parse snapshot {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections::default(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to read snapshot {}", path.display()))
            }
        };
        info!(
            path = %path.display(),
            students = collections.students.len(),
            admins = collections.admins.len(),
            "record store loaded from snapshot"
        );
        Ok(Self {
            inner: Arc::new(RwLock::new(collections)),
            snapshot: Some(Arc::new(path)),
        })
    }

    /// Apply `f` under the write lock.
    ///
    /// With a snapshot configured, `f` runs against a copy that only replaces
    /// the live state once the snapshot has been written, so a failed flush
    /// leaves the store unchanged.
    ///
    /// The lock, `f`, the flush and the swap run as one spawned task. A caller
    /// that stops waiting (see [`BoundedStore`](super::BoundedStore)) does not
    /// cancel it, so memory and snapshot never disagree about a write; the
    /// write may land after the caller has already seen a timeout.
    async fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Collections) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let snapshot = self.snapshot.clone();
        tokio::spawn(async move {
            let mut guard = inner.write().await;
            match snapshot {
                None => f(&mut *guard),
                Some(path) => {
                    let mut next = (*guard).clone();
                    let out = f(&mut next)?;
                    persist(&path, &next).await?;
                    *guard = next;
                    Ok(out)
                }
            }
        })
        .await
        .map_err(|e| StoreError::Persistence(format!("store write task failed: {e}")))?
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn persist(path: &Path, collections: &Collections) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(collections)
        .map_err(|e| StoreError::Persistence(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StoreError::Persistence(e.to_string()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::Persistence(e.to_string()))?;
    debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StoreError> {
        self.mutate(move |c| {
            let docs = c.docs_mut(collection);
            if docs.iter().any(|d| d.unique_key == doc.unique_key) {
                return Err(StoreError::DuplicateKey(collection));
            }
            docs.push(doc.clone());
            Ok(doc)
        })
        .await
    }

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Document>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.docs(collection).iter().find(|d| d.id == id).cloned())
    }

    async fn find_by_key(
        &self,
        collection: Collection,
        unique_key: &str,
    ) -> Result<Option<Document>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .docs(collection)
            .iter()
            .find(|d| d.unique_key == unique_key)
            .cloned())
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        Ok(self.inner.read().await.docs(collection).clone())
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        update: DocumentUpdate,
    ) -> Result<Option<Document>, StoreError> {
        self.mutate(move |c| {
            let docs = c.docs_mut(collection);
            let Some(pos) = docs.iter().position(|d| d.id == id) else {
                return Ok(None);
            };
            if let Some(key) = &update.unique_key {
                if docs.iter().any(|d| d.id != id && &d.unique_key == key) {
                    return Err(StoreError::DuplicateKey(collection));
                }
            }
            let doc = &mut docs[pos];
            doc.fields.extend(update.fields);
            if let Some(key) = update.unique_key {
                doc.unique_key = key;
            }
            doc.revision += 1;
            Ok(Some(doc.clone()))
        })
        .await
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError> {
        {
            // Skip the snapshot flush entirely for a miss.
            let guard = self.inner.read().await;
            if !guard.docs(collection).iter().any(|d| d.id == id) {
                return Ok(false);
            }
        }
        self.mutate(move |c| {
            let docs = c.docs_mut(collection);
            let before = docs.len();
            docs.retain(|d| d.id != id);
            Ok(docs.len() != before)
        })
        .await
    }

    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.docs(collection).len() as u64)
    }
}
