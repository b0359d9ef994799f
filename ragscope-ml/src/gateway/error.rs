//! HTTP error responses: `{"detail": "<message>"}` with a status per error kind.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ragscope_core::error::RagError;
use serde_json::json;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            RagError::NotFound { .. } => StatusCode::NOT_FOUND,
            RagError::DependencyUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RagError::JudgeUnscoreable { .. } | RagError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let detail = match err {
            RagError::InvalidInput { message }
            | RagError::NotFound { message }
            | RagError::Internal { message } => message,
            other => other.to_string(),
        };
        Self { status, detail }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
