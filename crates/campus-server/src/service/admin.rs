//! Admin-panel accounts: authentication and CRUD.
//!
//! Only the password is enciphered, once, by the server. It is decrypted
//! solely to check a login and is never returned by any read.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use common::protocol::{AdminPatch, AdminRecord, LoginRequest, LoginResponse, NewAdmin};
use common::{Role, ServiceError};

use super::{blank_fields, not_found, reject_blank, to_object, Listing};
use crate::codec::{ADMINS, SERVER_LAYERS};
use crate::crypto::Cipher;
use crate::store::{Collection, Document, DocumentUpdate, RecordStore};

const COLLECTION: Collection = Collection::Admins;

/// Fields removed from every admin read.
const HIDDEN: &[&str] = &["password"];

/// Fields that may not be blank when present.
const REQUIRED: &[&str] = &["email", "password"];

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn RecordStore>,
    cipher: Arc<Cipher>,
}

impl AdminService {
    pub fn new(store: Arc<dyn RecordStore>, cipher: Arc<Cipher>) -> Self {
        Self { store, cipher }
    }

    /// Create an account. An absent or empty role defaults to [`Role::User`].
    ///
    /// # Errors
    ///
    /// [`ServiceError::BadRequest`] for an unknown role or blank credentials
    /// (checked before any write), [`ServiceError::Conflict`] if the email is taken.
    pub async fn register(&self, admin: NewAdmin) -> Result<Uuid, ServiceError> {
        let role = match admin.role.as_deref() {
            None | Some("") => Role::default(),
            Some(raw) => raw.parse::<Role>()?,
        };
        let mut fields = to_object(&admin)?;
        fields.insert("role".into(), role.as_str().into());
        reject_blank(blank_fields(&fields, REQUIRED))?;

        ADMINS.seal(&self.cipher, &mut fields)?;
        let doc = self
            .store
            .insert(COLLECTION, Document::new(admin.email, SERVER_LAYERS, fields))
            .await?;
        info!(id = %doc.id, %role, "admin registered");
        Ok(doc.id)
    }

    /// Check an email/password pair.
    ///
    /// Every failure mode, including a stored password that no longer
    /// decrypts, is reported as [`ServiceError::Unauthorized`].
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ServiceError> {
        let Some(doc) = self.store.find_by_key(COLLECTION, &req.email).await? else {
            info!("login rejected: unknown account");
            return Err(ServiceError::Unauthorized);
        };

        let opened = match ADMINS.open(&self.cipher, &doc, &[]) {
            Ok(fields) => fields,
            Err(e) => {
                warn!(id = %doc.id, error = %e, "stored password failed to open");
                return Err(ServiceError::Unauthorized);
            }
        };
        let stored = opened.get("password").and_then(|v| v.as_str());
        if stored != Some(req.password.as_str()) {
            info!(id = %doc.id, "login rejected: wrong password");
            return Err(ServiceError::Unauthorized);
        }

        let record: AdminRecord = ADMINS.open_as(&self.cipher, &doc, HIDDEN)?;
        info!(id = %doc.id, role = %record.role, "login succeeded");
        Ok(LoginResponse {
            message: "Login successful".into(),
            role: record.role,
            email: record.email,
        })
    }

    /// Every account, without passwords.
    pub async fn list(&self) -> Result<Listing<AdminRecord>, ServiceError> {
        let docs = self.store.list(COLLECTION).await?;
        let mut listing = Listing {
            records: Vec::with_capacity(docs.len()),
            skipped: Vec::new(),
        };
        for doc in &docs {
            match ADMINS.open_as::<AdminRecord>(&self.cipher, doc, HIDDEN) {
                Ok(record) => listing.records.push(record),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "skipping admin that failed to open");
                    listing.skipped.push(doc.id);
                }
            }
        }
        Ok(listing)
    }

    pub async fn get(&self, id: Uuid) -> Result<AdminRecord, ServiceError> {
        let doc = self
            .store
            .get(COLLECTION, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        Ok(ADMINS.open_as(&self.cipher, &doc, HIDDEN)?)
    }

    /// Apply a partial update. Returns the new revision.
    ///
    /// An empty role leaves the stored role unchanged.
    ///
    /// # Errors
    ///
    /// [`ServiceError::BadRequest`] for an unknown role or blank credentials,
    /// [`ServiceError::NotFound`] for an unknown id,
    /// [`ServiceError::Conflict`] if a new email is taken.
    pub async fn update(&self, id: Uuid, mut patch: AdminPatch) -> Result<u64, ServiceError> {
        if patch.role.as_deref() == Some("") {
            patch.role = None;
        }
        if let Some(raw) = patch.role.as_deref() {
            raw.parse::<Role>()?;
        }
        let mut fields = to_object(&patch)?;
        reject_blank(blank_fields(&fields, REQUIRED))?;

        if fields.is_empty() {
            let doc = self.store.get(COLLECTION, id).await?.ok_or_else(|| not_found(id))?;
            return Ok(doc.revision);
        }

        ADMINS.seal(&self.cipher, &mut fields)?;
        let update = DocumentUpdate {
            fields,
            unique_key: patch.email,
        };
        let updated = self
            .store
            .update(COLLECTION, id, update)
            .await?
            .ok_or_else(|| not_found(id))?;
        info!(id = %id, revision = updated.revision, "admin updated");
        Ok(updated.revision)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete(COLLECTION, id).await? {
            return Err(not_found(id));
        }
        info!(id = %id, "admin deleted");
        Ok(())
    }

    /// `(total admins, total students)`.
    pub async fn counts(&self) -> Result<(u64, u64), ServiceError> {
        let admins = self.store.count(COLLECTION).await?;
        let students = self.store.count(Collection::Students).await?;
        Ok((admins, students))
    }
}
