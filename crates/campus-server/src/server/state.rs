//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::crypto::Cipher;
use crate::service::{AdminService, StudentService};
use crate::store::RecordStore;

/// Application state shared across all request handlers.
///
/// Both services hold only `Arc`s, so Axum can clone the state for each
/// request without copying the store or key material.
#[derive(Clone)]
pub struct AppState {
    /// Student CRUD over the `students` collection.
    pub students: StudentService,
    /// Admin authentication and CRUD over the `admins` collection.
    pub admins: AdminService,
}

impl AppState {
    /// Create a new [`AppState`] whose services share one store and cipher.
    pub fn new(store: Arc<dyn RecordStore>, cipher: Arc<Cipher>) -> Self {
        Self {
            students: StudentService::new(store.clone(), cipher.clone()),
            admins: AdminService::new(store, cipher),
        }
    }
}

#[cfg(test)]
impl AppState {
    /// State over an empty in-memory store keyed with the test secret.
    pub fn for_tests() -> Self {
        let cfg = crate::config::Config::for_tests();
        let cipher = Cipher::from_secret(&cfg.cipher_secret).expect("test secret is valid");
        Self::new(
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(cipher),
        )
    }
}
