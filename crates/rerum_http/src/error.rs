//! HTTP error envelope.
//!
//! Every failure leaves as `{"error": {"code": ..., "message": ...}}` with a
//! status derived from the core error class.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, warn};
use rerum_core::{DocumentServiceError, ErrorKind, RepoError};
use serde::Serialize;
use serde_json::json;

/// Error returned by handlers and extractors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }
}

impl From<DocumentServiceError> for ApiError {
    fn from(err: DocumentServiceError) -> Self {
        let status = match err.kind() {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Upstream => match &err {
                DocumentServiceError::Repo(RepoError::Db(_)) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        Self::new(status, service_code(&err), err.to_string())
    }
}

fn service_code(err: &DocumentServiceError) -> &'static str {
    match err {
        DocumentServiceError::InvalidPayload(_) => "invalid_payload",
        DocumentServiceError::MissingAddress => "missing_address",
        DocumentServiceError::MissingSlug => "missing_slug",
        DocumentServiceError::InvalidSlug(_) => "invalid_slug",
        DocumentServiceError::InvalidQuery(_) => "invalid_query",
        DocumentServiceError::NotFound(_) => "not_found",
        DocumentServiceError::MissingKeys(_) => "missing_keys",
        DocumentServiceError::Deleted(_) => "deleted",
        DocumentServiceError::NotGenerator(_) => "not_generator",
        DocumentServiceError::Released(_) => "released",
        DocumentServiceError::AlreadyReleased(_) => "already_released",
        DocumentServiceError::SlugInUse(_) => "slug_in_use",
        DocumentServiceError::VersionMismatch { .. } => "version_mismatch",
        DocumentServiceError::ConcurrentWrite(_) => "concurrent_write",
        DocumentServiceError::HistoryCycle(_) => "history_cycle",
        DocumentServiceError::Repo(RepoError::Db(_)) => "upstream_failure",
        DocumentServiceError::Repo(_) => "internal_error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                "event=http_error module=http status=error code={} message={}",
                self.code, self.message
            );
        } else {
            warn!(
                "event=http_error module=http status=rejected code={} http_status={}",
                self.code,
                self.status.as_u16()
            );
        }
        (self.status, Json(json!({ "error": self }))).into_response()
    }
}
