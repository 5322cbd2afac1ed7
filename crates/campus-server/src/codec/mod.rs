//! Field-level sealing and opening of records.
//!
//! A [`FieldCodec`] knows which top-level fields of a record are sensitive
//! and how many cipher layers a value carries when it reaches the server.
//! Sealing adds exactly one server layer to every sensitive field present;
//! opening removes exactly one.
//!
//! | Collection | Sensitive fields | Layers received | Layers at rest | Layers returned |
//! |------------|------------------|-----------------|----------------|-----------------|
//! | students   | all eight        | 1               | 2              | 1               |
//! | admins     | `password`       | 0               | 1              | never returned  |

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use common::ServiceError;

use crate::crypto::{Cipher, CipherError};
use crate::store::Document;

/// Layers the server adds on write and removes on read.
pub const SERVER_LAYERS: u8 = 1;

/// Every field of a student record.
pub const STUDENT_FIELDS: &[&str] = &[
    "fullName",
    "email",
    "phoneNumber",
    "dateOfBirth",
    "gender",
    "address",
    "courseEnrolled",
    "password",
];

/// Student records: every field is sensitive and arrives client-enciphered.
pub const STUDENTS: FieldCodec = FieldCodec::new(STUDENT_FIELDS, 1);

/// Admin records: only the password is sensitive, and it arrives in the clear.
pub const ADMINS: FieldCodec = FieldCodec::new(&["password"], 0);

/// Errors produced while sealing or opening a record.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A sensitive field in an incoming record is not a JSON string.
    #[error("field {0} must be a string")]
    NotAString(&'static str),

    /// A cipher operation on one field failed.
    #[error("field {field}: {source}")]
    Cipher {
        field: &'static str,
        #[source]
        source: CipherError,
    },

    /// The stored document carries a different number of server layers than expected.
    #[error("document has {found} server layer(s), expected {expected}")]
    LayerMismatch { expected: u8, found: u8 },

    /// A stored document is missing fields or holds non-string values.
    #[error("stored document is malformed: {0}")]
    Malformed(String),
}

impl From<CodecError> for ServiceError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::NotAString(_) => ServiceError::BadRequest(err.to_string()),
            _ => ServiceError::EncryptionFailure(err.to_string()),
        }
    }
}

/// Applies a [`Cipher`] to the sensitive fields of a record.
#[derive(Debug, Clone, Copy)]
pub struct FieldCodec {
    sensitive: &'static [&'static str],
    client_layers: u8,
}

impl FieldCodec {
    pub const fn new(sensitive: &'static [&'static str], client_layers: u8) -> Self {
        Self {
            sensitive,
            client_layers,
        }
    }

    /// Total layers a sensitive value carries in storage.
    pub fn stored_layers(&self) -> u8 {
        self.client_layers + SERVER_LAYERS
    }

    /// Layers still present on a value after [`FieldCodec::open`].
    pub fn returned_layers(&self) -> u8 {
        self.client_layers
    }

    /// Encrypt, in place, every sensitive field present in `record`.
    ///
    /// Absent fields are left absent, which is what makes partial updates
    /// re-encipher only the fields they name.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NotAString`] if a sensitive field holds a
    /// non-string value, or [`CodecError::Cipher`] on an encryption failure.
    pub fn seal(&self, cipher: &Cipher, record: &mut Map<String, Value>) -> Result<(), CodecError> {
        for &field in self.sensitive {
            let Some(value) = record.get_mut(field) else {
                continue;
            };
            let Value::String(plain) = value else {
                return Err(CodecError::NotAString(field));
            };
            let sealed = cipher
                .encrypt(plain)
                .map_err(|source| CodecError::Cipher { field, source })?;
            *value = Value::String(sealed);
        }
        Ok(())
    }

    /// Decrypt one layer from every sensitive field of `doc`, skipping any
    /// field named in `hidden` (hidden fields are removed, not decrypted).
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::LayerMismatch`] if the document was not written
    /// with [`SERVER_LAYERS`], and [`CodecError::Cipher`] or
    /// [`CodecError::Malformed`] if any sensitive value cannot be opened.
    pub fn open(
        &self,
        cipher: &Cipher,
        doc: &Document,
        hidden: &[&str],
    ) -> Result<Map<String, Value>, CodecError> {
        if doc.layers != SERVER_LAYERS {
            return Err(CodecError::LayerMismatch {
                expected: SERVER_LAYERS,
                found: doc.layers,
            });
        }
        let mut fields = doc.fields.clone();
        for name in hidden {
            fields.remove(*name);
        }
        for &field in self.sensitive {
            let Some(value) = fields.get_mut(field) else {
                continue;
            };
            let Value::String(sealed) = value else {
                return Err(CodecError::Malformed(format!("{field} is not a string")));
            };
            let opened = cipher
                .decrypt(sealed)
                .map_err(|source| CodecError::Cipher { field, source })?;
            *value = Value::String(opened);
        }
        Ok(fields)
    }

    /// [`FieldCodec::open`] `doc` and deserialise it, together with its `_id`
    /// and `revision`, into a response type.
    pub fn open_as<T: DeserializeOwned>(
        &self,
        cipher: &Cipher,
        doc: &Document,
        hidden: &[&str],
    ) -> Result<T, CodecError> {
        let mut fields = self.open(cipher, doc, hidden)?;
        fields.insert("_id".into(), Value::String(doc.id.to_string()));
        fields.insert("revision".into(), Value::from(doc.revision));
        serde_json::from_value(Value::Object(fields))
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }
}
