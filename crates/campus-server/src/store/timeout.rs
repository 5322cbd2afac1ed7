//! [`BoundedStore`]: applies a per-call deadline to any [`RecordStore`].

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use super::{Collection, Document, DocumentUpdate, RecordStore, StoreError};

/// Wraps another store so that no call waits longer than `limit`.
///
/// An expired call surfaces as [`StoreError::Timeout`] and the inner future is
/// dropped. Whether the write still happens is up to the inner store;
/// [`MemoryStore`](super::MemoryStore) finishes it.
#[derive(Clone)]
pub struct BoundedStore {
    inner: Arc<dyn RecordStore>,
    limit: Duration,
}

impl BoundedStore {
    pub fn new(inner: Arc<dyn RecordStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        collection: Collection,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, %collection, limit_ms = self.limit.as_millis() as u64, "store call timed out");
                Err(StoreError::Timeout(self.limit))
            }
        }
    }
}

#[async_trait]
impl RecordStore for BoundedStore {
    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StoreError> {
        self.bounded("insert", collection, self.inner.insert(collection, doc))
            .await
    }

    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Document>, StoreError> {
        self.bounded("get", collection, self.inner.get(collection, id))
            .await
    }

    async fn find_by_key(
        &self,
        collection: Collection,
        unique_key: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.bounded(
            "find_by_key",
            collection,
            self.inner.find_by_key(collection, unique_key),
        )
        .await
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        self.bounded("list", collection, self.inner.list(collection))
            .await
    }

    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        update: DocumentUpdate,
    ) -> Result<Option<Document>, StoreError> {
        self.bounded("update", collection, self.inner.update(collection, id, update))
            .await
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError> {
        self.bounded("delete", collection, self.inner.delete(collection, id))
            .await
    }

    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        self.bounded("count", collection, self.inner.count(collection))
            .await
    }
}
