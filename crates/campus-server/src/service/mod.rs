//! Record services: the operations behind every HTTP route.
//!
//! Services own the encryption policy for their collection. They seal
//! incoming values with the collection's [`FieldCodec`](crate::codec::FieldCodec),
//! talk to the store through the [`RecordStore`](crate::store::RecordStore)
//! seam, and report failures as [`ServiceError`].

pub mod admin;
pub mod student;

pub use admin::AdminService;
pub use student::StudentService;

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use common::ServiceError;

use crate::crypto::CipherError;

/// Result of a listing under the skip-and-report policy.
///
/// Records that cannot be opened are left out of `records` and their ids are
/// collected in `skipped`; one corrupt document never fails the whole list.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub records: Vec<T>,
    pub skipped: Vec<Uuid>,
}

impl From<CipherError> for ServiceError {
    fn from(err: CipherError) -> Self {
        ServiceError::EncryptionFailure(err.to_string())
    }
}

/// Parse a path identifier. Anything that is not a UUID cannot name a record.
pub fn parse_id(raw: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(raw).map_err(|_| ServiceError::NotFound(format!("no record with id {raw}")))
}

fn not_found(id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("no record with id {id}"))
}

/// Serialise a request body into the JSON object the codec works on.
fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>, ServiceError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ServiceError::Internal("record did not serialise to an object".into())),
        Err(e) => Err(ServiceError::Internal(e.to_string())),
    }
}

/// Names of `fields` entries that are present but blank.
fn blank_fields<'a>(fields: &Map<String, Value>, names: &[&'a str]) -> Vec<&'a str> {
    names
        .iter()
        .filter(|name| {
            fields
                .get(**name)
                .and_then(Value::as_str)
                .is_some_and(|v| v.trim().is_empty())
        })
        .copied()
        .collect()
}

fn reject_blank(blank: Vec<&str>) -> Result<(), ServiceError> {
    if blank.is_empty() {
        return Ok(());
    }
    Err(ServiceError::BadRequest(format!(
        "missing required field(s): {}",
        blank.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_id_rejects_non_uuid_as_not_found() {
        let err = parse_id("64b7f0c2e4b0a1a2b3c4d5e6").unwrap_err();
        assert_eq!(err.http_status(), 404);
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn blank_fields_ignores_absent_keys() {
        let fields = json!({"a": "", "b": "  ", "c": "x"});
        let blank = blank_fields(fields.as_object().unwrap(), &["a", "b", "c", "d"]);
        assert_eq!(blank, ["a", "b"]);
    }

    #[test]
    fn reject_blank_lists_fields() {
        let err = reject_blank(vec!["email", "password"]).unwrap_err();
        assert!(err.to_string().contains("email, password"));
        assert!(reject_blank(vec![]).is_ok());
    }
}
