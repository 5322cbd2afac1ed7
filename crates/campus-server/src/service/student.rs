//! Student records: every field is enciphered by the client once and by the
//! server once more; reads strip the server layer only.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use common::protocol::{NewStudent, StudentPatch, StudentRecord};
use common::ServiceError;

use super::{blank_fields, not_found, reject_blank, to_object, Listing};
use crate::codec::{SERVER_LAYERS, STUDENTS, STUDENT_FIELDS};
use crate::crypto::Cipher;
use crate::store::{Collection, Document, DocumentUpdate, RecordStore};

const COLLECTION: Collection = Collection::Students;

#[derive(Clone)]
pub struct StudentService {
    store: Arc<dyn RecordStore>,
    cipher: Arc<Cipher>,
}

impl StudentService {
    pub fn new(store: Arc<dyn RecordStore>, cipher: Arc<Cipher>) -> Self {
        Self { store, cipher }
    }

    /// Seal and store a new student.
    ///
    /// Uniqueness is judged on the blind index of the email exactly as the
    /// server received it.
    ///
    /// # Errors
    ///
    /// [`ServiceError::BadRequest`] if any field is blank,
    /// [`ServiceError::Conflict`] if the email is already registered.
    pub async fn register(&self, student: NewStudent) -> Result<Uuid, ServiceError> {
        let mut fields = to_object(&student)?;
        reject_blank(blank_fields(&fields, STUDENT_FIELDS))?;

        let unique_key = self.cipher.blind_index(&student.email)?;
        STUDENTS.seal(&self.cipher, &mut fields)?;

        let doc = self
            .store
            .insert(COLLECTION, Document::new(unique_key, SERVER_LAYERS, fields))
            .await?;
        info!(id = %doc.id, layers = STUDENTS.stored_layers(), "student registered");
        Ok(doc.id)
    }

    /// Every student with the server layer removed.
    pub async fn list(&self) -> Result<Listing<StudentRecord>, ServiceError> {
        let docs = self.store.list(COLLECTION).await?;
        let mut listing = Listing {
            records: Vec::with_capacity(docs.len()),
            skipped: Vec::new(),
        };
        for doc in &docs {
            match STUDENTS.open_as::<StudentRecord>(&self.cipher, doc, &[]) {
                Ok(record) => listing.records.push(record),
                Err(e) => {
                    warn!(id = %doc.id, error = %e, "skipping student that failed to open");
                    listing.skipped.push(doc.id);
                }
            }
        }
        debug!(
            records = listing.records.len(),
            layers = STUDENTS.returned_layers(),
            "students opened"
        );
        Ok(listing)
    }

    /// Re-seal and overwrite the fields present in `patch`. Returns the new revision.
    ///
    /// # Errors
    ///
    /// [`ServiceError::NotFound`] if `id` names no student (nothing is
    /// created), [`ServiceError::BadRequest`] for blank values,
    /// [`ServiceError::Conflict`] if a new email is taken.
    pub async fn update(&self, id: Uuid, patch: StudentPatch) -> Result<u64, ServiceError> {
        let mut fields = to_object(&patch)?;
        reject_blank(blank_fields(&fields, STUDENT_FIELDS))?;

        if fields.is_empty() {
            let doc = self.store.get(COLLECTION, id).await?.ok_or_else(|| not_found(id))?;
            return Ok(doc.revision);
        }

        let unique_key = match &patch.email {
            Some(email) => Some(self.cipher.blind_index(email)?),
            None => None,
        };
        STUDENTS.seal(&self.cipher, &mut fields)?;

        let updated = self
            .store
            .update(COLLECTION, id, DocumentUpdate { fields: fields.clone(), unique_key })
            .await?
            .ok_or_else(|| not_found(id))?;
        info!(
            id = %id,
            revision = updated.revision,
            fields = fields.len(),
            "student updated"
        );
        Ok(updated.revision)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete(COLLECTION, id).await? {
            return Err(not_found(id));
        }
        info!(id = %id, "student deleted");
        Ok(())
    }

    pub async fn count(&self) -> Result<u64, ServiceError> {
        Ok(self.store.count(COLLECTION).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockRecordStore, StoreError};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn client() -> Cipher {
        Cipher::from_secret("client-test-secret").unwrap()
    }

    fn service_with(store: Arc<dyn RecordStore>) -> StudentService {
        StudentService::new(
            store,
            Arc::new(Cipher::from_secret("server-test-secret").unwrap()),
        )
    }

    fn service() -> (StudentService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (service_with(store.clone()), store)
    }

    /// What the browser sends: each value already under the client's key.
    fn enciphered_student(c: &Cipher, name: &str, email: &str) -> NewStudent {
        let e = |v: &str| c.encrypt(v).unwrap();
        NewStudent {
            full_name: e(name),
            email: e(email),
            phone_number: e("555-0100"),
            date_of_birth: e("2001-02-03"),
            gender: e("female"),
            address: e("1 Campus Way"),
            course_enrolled: e("CS101"),
            password: e("hunter2"),
        }
    }

    #[tokio::test]
    async fn registered_student_lists_with_one_layer_left() {
        let (svc, _) = service();
        let c = client();
        svc.register(enciphered_student(&c, "A", "a@campus.edu"))
            .await
            .unwrap();

        let listing = svc.list().await.unwrap();
        assert!(listing.skipped.is_empty());
        let rec = &listing.records[0];
        assert_eq!(c.decrypt(&rec.full_name).unwrap(), "A");
        assert_eq!(c.decrypt(&rec.email).unwrap(), "a@campus.edu");
        assert_eq!(c.decrypt(&rec.course_enrolled).unwrap(), "CS101");
    }

    #[tokio::test]
    async fn stored_values_carry_two_layers() {
        let (svc, store) = service();
        let c = client();
        let server = Cipher::from_secret("server-test-secret").unwrap();
        let id = svc
            .register(enciphered_student(&c, "A", "a@campus.edu"))
            .await
            .unwrap();

        let doc = store.get(COLLECTION, id).await.unwrap().unwrap();
        let stored = doc.fields["fullName"].as_str().unwrap();
        // Neither key alone recovers the plaintext.
        assert!(c.decrypt(stored).is_err());
        let once = server.decrypt(stored).unwrap();
        assert_ne!(once, "A");
        assert_eq!(c.decrypt(&once).unwrap(), "A");
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let (svc, store) = service();
        let mut s = enciphered_student(&client(), "A", "a@campus.edu");
        s.address.clear();
        let err = svc.register(s).await.unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(err.to_string().contains("address"));
        assert_eq!(store.count(COLLECTION).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let (svc, _) = service();
        let s = enciphered_student(&client(), "A", "a@campus.edu");
        svc.register(s.clone()).await.unwrap();
        let err = svc.register(s).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_reseals_only_present_fields() {
        let (svc, store) = service();
        let c = client();
        let id = svc
            .register(enciphered_student(&c, "A", "a@campus.edu"))
            .await
            .unwrap();
        let before = store.get(COLLECTION, id).await.unwrap().unwrap();

        let patch = StudentPatch {
            full_name: Some(c.encrypt("B").unwrap()),
            ..Default::default()
        };
        assert_eq!(svc.update(id, patch).await.unwrap(), 2);

        let after = store.get(COLLECTION, id).await.unwrap().unwrap();
        assert_eq!(after.fields["email"], before.fields["email"]);
        assert_ne!(after.fields["fullName"], before.fields["fullName"]);

        let rec = svc.list().await.unwrap().records.remove(0);
        assert_eq!(c.decrypt(&rec.full_name).unwrap(), "B");
        assert_eq!(rec.revision, 2);
    }

    #[tokio::test]
    async fn update_unknown_id_is_not_found_and_creates_nothing() {
        let (svc, store) = service();
        let patch = StudentPatch {
            gender: Some("x".into()),
            ..Default::default()
        };
        let err = svc.update(Uuid::new_v4(), patch).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(store.count(COLLECTION).await.unwrap(), 0);

        let err = svc
            .update(Uuid::new_v4(), StudentPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_unknown_id_with_taken_email_is_not_found() {
        let (svc, store) = service();
        let first = enciphered_student(&client(), "A", "a@campus.edu");
        let taken_email = first.email.clone();
        svc.register(first).await.unwrap();
        let patch = StudentPatch {
            email: Some(taken_email),
            ..Default::default()
        };
        let err = svc.update(Uuid::new_v4(), patch).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(store.count(COLLECTION).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_to_taken_email_is_conflict() {
        let (svc, _) = service();
        let c = client();
        let first = enciphered_student(&c, "A", "a@campus.edu");
        let taken_email = first.email.clone();
        svc.register(first).await.unwrap();
        let id = svc
            .register(enciphered_student(&c, "B", "b@campus.edu"))
            .await
            .unwrap();

        let patch = StudentPatch {
            email: Some(taken_email),
            ..Default::default()
        };
        let err = svc.update(id, patch).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn corrupt_record_is_skipped_and_reported() {
        let (svc, store) = service();
        let c = client();
        svc.register(enciphered_student(&c, "A", "a@campus.edu"))
            .await
            .unwrap();
        let bad = store
            .insert(
                COLLECTION,
                Document::new(
                    "corrupt".into(),
                    SERVER_LAYERS,
                    json!({"fullName": "not-a-valid-ciphertext"})
                        .as_object()
                        .cloned()
                        .unwrap(),
                ),
            )
            .await
            .unwrap();

        let listing = svc.list().await.unwrap();
        assert_eq!(listing.records.len(), 1);
        assert_eq!(listing.skipped, vec![bad.id]);
    }

    #[tokio::test]
    async fn delete_and_count() {
        let (svc, _) = service();
        let id = svc
            .register(enciphered_student(&client(), "A", "a@campus.edu"))
            .await
            .unwrap();
        assert_eq!(svc.count().await.unwrap(), 1);
        svc.delete(id).await.unwrap();
        assert_eq!(svc.count().await.unwrap(), 0);
        assert!(matches!(
            svc.delete(id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn store_timeout_surfaces_as_unavailable() {
        let mut mock = MockRecordStore::new();
        mock.expect_list()
            .returning(|_| Err(StoreError::Timeout(Duration::from_millis(5))));
        let svc = service_with(Arc::new(mock));
        let err = svc.list().await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn invalid_registration_never_reaches_store() {
        let mut mock = MockRecordStore::new();
        mock.expect_insert().never();
        let svc = service_with(Arc::new(mock));
        let err = svc.register(NewStudent::default()).await.unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn sealed_values_are_strings_in_storage() {
        let (svc, store) = service();
        let id = svc
            .register(enciphered_student(&client(), "A", "a@campus.edu"))
            .await
            .unwrap();
        let doc = store.get(COLLECTION, id).await.unwrap().unwrap();
        assert_eq!(doc.layers, SERVER_LAYERS);
        for field in STUDENT_FIELDS {
            assert!(matches!(&doc.fields[*field], Value::String(s) if s.starts_with("v1.")));
        }
    }
}
