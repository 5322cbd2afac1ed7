//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::Unauthorized`] → 401
/// - [`ServiceError::NotFound`] → 404
/// - [`ServiceError::Conflict`] → 409
/// - [`ServiceError::EncryptionFailure`], [`ServiceError::Unavailable`],
///   [`ServiceError::Internal`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: missing field, invalid role, or invalid JSON.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Login failed. The message never says which half of the pair was wrong.
    #[error("invalid credentials")]
    Unauthorized,

    /// No record exists with the requested identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique key (email) is already taken by another record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Encryption or decryption failed due to a crypto-layer error.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// The record store did not answer in time or could not persist.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Unauthorized => 401,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::Unavailable(_) => 500,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code placed in error response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::EncryptionFailure(_) => "encryption_failure",
            ServiceError::Unavailable(_) => "store_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// Message that is safe to return to HTTP callers.
    ///
    /// Client-caused errors echo their detail; server-side failures are
    /// replaced with a generic string so cipher and store internals stay in
    /// the logs.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::BadRequest(_)
            | ServiceError::Unauthorized
            | ServiceError::NotFound(_)
            | ServiceError::Conflict(_) => self.to_string(),
            ServiceError::EncryptionFailure(_) => "encryption failure".into(),
            ServiceError::Unavailable(_) => "store unavailable".into(),
            ServiceError::Internal(_) => "internal error".into(),
        }
    }

    /// Returns `true` for errors the caller caused (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}
