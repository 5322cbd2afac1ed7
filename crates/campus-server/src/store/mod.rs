//! Document persistence for the `students` and `admins` collections.
//!
//! # Responsibilities
//!
//! - Hold records as schemaless [`Document`]s whose `fields` are a JSON object,
//!   mirroring how the field codec sees them.
//! - Enforce one unique key per collection (derived from email by the
//!   services; the store never interprets it).
//! - Provide single-document atomicity only. Concurrent updates to the same
//!   document race and the last write wins; [`Document::revision`] records
//!   how many writes a document has seen.
//!
//! # Module invariants
//!
//! - **No crypto dependencies.** The store only ever sees already-sealed
//!   field values and opaque unique keys.

pub mod memory;
pub mod timeout;

pub use memory::MemoryStore;
pub use timeout::BoundedStore;

use std::{fmt, time::Duration};

use async_trait::async_trait;
use common::ServiceError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// The two record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Students,
    Admins,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::Admins => "admins",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    /// Starts at 1 and is bumped by every successful update.
    pub revision: u64,
    /// Value checked for uniqueness within the collection.
    pub unique_key: String,
    /// Number of server-side cipher layers on the sensitive fields.
    pub layers: u8,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a first-revision document with a fresh random identifier.
    pub fn new(unique_key: String, layers: u8, fields: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            revision: 1,
            unique_key,
            layers,
            fields,
        }
    }
}

/// Partial replacement applied by [`RecordStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentUpdate {
    /// Fields to overwrite; fields not named here keep their stored value.
    pub fields: Map<String, Value>,
    /// New unique key, when the update changes it.
    pub unique_key: Option<String>,
}

/// Errors produced by the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another document in the collection already holds the unique key.
    #[error("duplicate key in {0}")]
    DuplicateKey(Collection),

    /// The store did not answer within the configured bound.
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// The snapshot file could not be written.
    #[error("snapshot persistence failed: {0}")]
    Persistence(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey(_) => {
                ServiceError::Conflict("a record with this email already exists".into())
            }
            StoreError::Timeout(_) | StoreError::Persistence(_) => {
                ServiceError::Unavailable(err.to_string())
            }
        }
    }
}

/// Persistence seam used by the services.
///
/// Implementations must make each call atomic with respect to a single
/// document and must never create a document from [`RecordStore::update`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a new document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if the unique key is taken.
    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, StoreError>;

    /// Fetch a document by identifier.
    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Fetch the document holding `unique_key`.
    async fn find_by_key(
        &self,
        collection: Collection,
        unique_key: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// All documents in insertion order.
    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError>;

    /// Merge `update` into an existing document and bump its revision.
    ///
    /// Returns `Ok(None)` when no document has `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if the new unique key belongs to
    /// another document.
    async fn update(
        &self,
        collection: Collection,
        id: Uuid,
        update: DocumentUpdate,
    ) -> Result<Option<Document>, StoreError>;

    /// Remove a document. Returns `false` when no document has `id`.
    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, StoreError>;

    /// Number of documents in the collection.
    async fn count(&self, collection: Collection) -> Result<u64, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_document_starts_at_revision_one() {
        let a = Document::new("k".into(), 1, Map::new());
        let b = Document::new("k".into(), 1, Map::new());
        assert_eq!(a.revision, 1);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn store_errors_map_to_service_errors() {
        let dup: ServiceError = StoreError::DuplicateKey(Collection::Admins).into();
        assert_eq!(dup.http_status(), 409);
        let slow: ServiceError = StoreError::Timeout(Duration::from_millis(10)).into();
        assert!(matches!(slow, ServiceError::Unavailable(_)));
        assert_eq!(slow.http_status(), 500);
    }

    #[test]
    fn collection_display() {
        assert_eq!(Collection::Students.to_string(), "students");
        assert_eq!(Collection::Admins.to_string(), "admins");
    }
}
