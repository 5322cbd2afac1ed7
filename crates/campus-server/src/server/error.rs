//! Conversion of [`ServiceError`] into HTTP responses, and the JSON body
//! extractor whose rejections use the same error shape.

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use tracing::{debug, error};

/// A [`ServiceError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ServiceError::BadRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.0.is_client_error() {
            debug!(status = status.as_u16(), error = %self.0, "request rejected");
        } else {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

/// `Json<T>` whose rejection is a 400 with an [`ErrorResponse`] body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(resp: Response) -> ErrorResponse {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn conflict_maps_to_409() {
        let resp = ApiError(ServiceError::Conflict("email taken".into())).into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body = body_of(resp).await;
        assert_eq!(body.code, "conflict");
        assert!(body.error.contains("email taken"));
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let resp =
            ApiError(ServiceError::EncryptionFailure("field password: aead".into())).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(resp).await;
        assert!(!body.error.contains("password"));
    }

    #[tokio::test]
    async fn unauthorized_maps_to_401() {
        let resp = ApiError(ServiceError::Unauthorized).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
