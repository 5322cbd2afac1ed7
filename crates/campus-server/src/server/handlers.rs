//! Axum request handlers for all service endpoints.

use axum::{
    extract::{Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{
    AdminPatch, AdminRecord, CountsResponse, ErrorResponse, HealthResponse, LoginRequest,
    LoginResponse, MessageResponse, NewAdmin, NewStudent, StudentCountResponse, StudentPatch,
};
use tracing::warn;

use super::error::{ApiError, ApiJson};
use super::state::AppState;
use crate::service::{parse_id, Listing};

/// Response header carrying the number of records left out of a listing
/// because they could not be decrypted.
pub const SKIPPED_RECORDS_HEADER: HeaderName = HeaderName::from_static("x-skipped-records");

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Students
// ---------------------------------------------------------------------------

/// `POST /api/register`: store a student whose fields the client has
/// already enciphered once.
pub async fn register_student(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewStudent>,
) -> ApiResult<impl IntoResponse> {
    state.students.register(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Student created successfully")),
    ))
}

/// `GET /api/students`: every student, still under the client's layer.
pub async fn list_students(State(state): State<AppState>) -> ApiResult<Response> {
    let listing = state.students.list().await?;
    Ok(listing_response(listing))
}

/// `PUT /api/student/:id`
pub async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<StudentPatch>,
) -> ApiResult<Json<MessageResponse>> {
    state.students.update(parse_id(&id)?, patch).await?;
    Ok(Json(MessageResponse::new("Student updated successfully")))
}

/// `DELETE /api/student/:id`
pub async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.students.delete(parse_id(&id)?).await?;
    Ok(Json(MessageResponse::new("Student deleted successfully")))
}

/// `GET /api/count`
pub async fn student_count(State(state): State<AppState>) -> ApiResult<Json<StudentCountResponse>> {
    let total_students = state.students.count().await?;
    Ok(Json(StudentCountResponse { total_students }))
}

// ---------------------------------------------------------------------------
// Admins
// ---------------------------------------------------------------------------

/// `POST /api/admin/register`
pub async fn register_admin(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewAdmin>,
) -> ApiResult<impl IntoResponse> {
    state.admins.register(body).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("Admin created successfully")),
    ))
}

/// `POST /api/admin/login`
pub async fn login_admin(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    Ok(Json(state.admins.login(body).await?))
}

/// `GET /api/admin/counts`
pub async fn admin_counts(State(state): State<AppState>) -> ApiResult<Json<CountsResponse>> {
    let (total_admins, total_students) = state.admins.counts().await?;
    Ok(Json(CountsResponse {
        total_admins,
        total_students,
    }))
}

/// `GET /api/admin/admins`
pub async fn list_admins(State(state): State<AppState>) -> ApiResult<Response> {
    let listing = state.admins.list().await?;
    Ok(listing_response(listing))
}

/// `GET /api/admin/admins/:id`
pub async fn get_admin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AdminRecord>> {
    Ok(Json(state.admins.get(parse_id(&id)?).await?))
}

/// `PUT /api/admin/admins/:id`
pub async fn update_admin(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<AdminPatch>,
) -> ApiResult<Json<MessageResponse>> {
    state.admins.update(parse_id(&id)?, patch).await?;
    Ok(Json(MessageResponse::new("Admin updated successfully")))
}

/// `DELETE /api/admin/admins/:id`
pub async fn delete_admin(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.admins.delete(parse_id(&id)?).await?;
    Ok(Json(MessageResponse::new("Admin deleted successfully")))
}

// ---------------------------------------------------------------------------
// Service endpoints
// ---------------------------------------------------------------------------

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` when the record store answers.
/// Returns `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let (status_code, body) = match state.admins.counts().await {
        Ok((admins, students)) => (
            StatusCode::OK,
            HealthResponse {
                status: "ok".into(),
                students: Some(students),
                admins: Some(admins),
            },
        ),
        Err(e) => {
            warn!(error = %e, "health check could not reach the record store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthResponse {
                    status: "degraded".into(),
                    students: None,
                    admins: None,
                },
            )
        }
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

/// Serialise the records of a listing, reporting skipped ones in a header.
fn listing_response<T: serde::Serialize>(listing: Listing<T>) -> Response {
    let skipped = listing.skipped.len();
    let mut resp = Json(listing.records).into_response();
    if skipped > 0 {
        warn!(skipped, "listing omitted records that failed to decrypt");
        resp.headers_mut()
            .insert(SKIPPED_RECORDS_HEADER, HeaderValue::from(skipped));
    }
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Collection, Document, RecordStore};
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn health_returns_200_with_empty_store() {
        let app = Router::new()
            .route("/health", get(health))
            .with_state(AppState::for_tests());
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn listing_without_skips_has_no_header() {
        let resp = listing_response(Listing::<u8> {
            records: vec![1, 2],
            skipped: vec![],
        });
        assert!(resp.headers().get(SKIPPED_RECORDS_HEADER).is_none());
    }

    #[test]
    fn listing_reports_skip_count() {
        let resp = listing_response(Listing::<u8> {
            records: vec![1],
            skipped: vec![Uuid::new_v4(), Uuid::new_v4()],
        });
        assert_eq!(resp.headers()[SKIPPED_RECORDS_HEADER], "2");
    }

    #[tokio::test]
    async fn student_list_reports_corrupt_record() {
        let store = std::sync::Arc::new(crate::store::MemoryStore::new());
        let cipher = crate::crypto::Cipher::from_secret("server-test-secret").unwrap();
        let state = AppState::new(store.clone(), std::sync::Arc::new(cipher));
        store
            .insert(
                Collection::Students,
                Document::new("bad".into(), 1, Default::default()),
            )
            .await
            .unwrap();

        let resp = list_students(State(state)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[SKIPPED_RECORDS_HEADER], "1");
    }
}
