//! Request and response types exchanged over the public HTTP API.
//!
//! Field names follow the camelCase convention of the browser frontend, and
//! record identifiers are serialised as `_id`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ServiceError;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Role of an admin-panel account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(ServiceError::BadRequest(
                "invalid role, role must be either \"admin\" or \"user\"".into(),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Students
// ---------------------------------------------------------------------------

/// Request body for `POST /api/register`.
///
/// Every value is expected to already carry one layer of client-side
/// encryption. Missing fields deserialise as empty strings and are rejected
/// by the student service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewStudent {
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub date_of_birth: String,
    pub gender: String,
    pub address: String,
    pub course_enrolled: String,
    pub password: String,
}

/// Request body for `PUT /api/student/:id`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_enrolled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// One element of the `GET /api/students` response.
///
/// Field values have had the server layer removed but still carry the
/// client's layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub revision: u64,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub date_of_birth: String,
    pub gender: String,
    pub address: String,
    pub course_enrolled: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Admins
// ---------------------------------------------------------------------------

/// Request body for `POST /api/admin/register`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewAdmin {
    pub email: String,
    pub password: String,
    /// Raw role string; validated by the admin service so that an unknown
    /// value yields a 400 rather than a deserialisation rejection.
    pub role: Option<String>,
}

/// Request body for `PUT /api/admin/admins/:id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_enrolled: Option<String>,
}

/// Admin account as returned by the list and get endpoints.
///
/// There is deliberately no password field on this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRecord {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub revision: u64,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_enrolled: Option<String>,
}

/// Request body for `POST /api/admin/login`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful response body for `POST /api/admin/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    pub role: Role,
    pub email: String,
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

/// Response body for `GET /api/count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCountResponse {
    pub total_students: u64,
}

/// Response body for `GET /api/admin/counts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountsResponse {
    pub total_admins: u64,
    pub total_students: u64,
}

// ---------------------------------------------------------------------------
// Generic bodies
// ---------------------------------------------------------------------------

/// Body returned by mutating endpoints on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable description safe to expose to callers.
    pub error: String,
    /// Short machine-readable error code (e.g. `"not_found"`).
    pub code: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self::new(err.code(), err.public_message())
    }
}

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Number of student records, when the store answered.
    pub students: Option<u64>,
    /// Number of admin records, when the store answered.
    pub admins: Option<u64>,
}
