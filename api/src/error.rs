//! Error-to-status mapping for the HTTP surface.
//!
//! Handlers are thin adapters: each maps domain error kinds to status codes
//! and never leaks stack traces. Internal detail stays in the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cortex_core::error::CoordError;

use crate::views::ErrorResponse;

/// Wrapper turning [`CoordError`] into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub CoordError);

impl From<CoordError> for ApiError {
    fn from(err: CoordError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // 5xx detail is logged, not exposed
        let message = if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
            "Internal server error".to_string()
        } else {
            self.0.to_string()
        };

        let kind = match &self.0 {
            CoordError::NotFound(_) => "not_found",
            CoordError::Validation(_) => "validation",
            CoordError::Conflict(_) => "conflict",
            CoordError::LockTimeout(_) => "lock_timeout",
            _ => "internal",
        };

        (status, Json(ErrorResponse::new(kind, &message))).into_response()
    }
}
