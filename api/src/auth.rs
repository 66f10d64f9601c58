//! Bearer-token authentication for the coordination API.
//!
//! Every `/v1` route except the health check requires
//! `Authorization: Bearer <token>` matching the configured server secret;
//! mismatches yield 401 without detail.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::views::ErrorResponse;

/// Middleware enforcing the bearer token.
pub async fn require_bearer(
    State(expected_token): State<String>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match validate_bearer(header, &expected_token) {
        Ok(()) => next.run(request).await,
        Err(message) => {
            tracing::warn!(reason = message, "Rejected unauthenticated request");
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("unauthorized", message)),
            )
                .into_response()
        }
    }
}

/// Validate an Authorization header value against the expected token.
fn validate_bearer(header: Option<&str>, expected_token: &str) -> Result<(), &'static str> {
    let Some(header) = header else {
        return Err("Authorization header is required");
    };

    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err("Invalid authorization header format. Expected 'Bearer <token>'");
    };

    if token != expected_token {
        return Err("Invalid authentication token");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_header_rejected() {
        assert!(validate_bearer(None, "secret").is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(validate_bearer(Some("secret"), "secret").is_err());
        assert!(validate_bearer(Some("Basic secret"), "secret").is_err());
        assert!(validate_bearer(Some("bearer secret"), "secret").is_err());
    }

    #[test]
    fn test_wrong_token_rejected() {
        assert!(validate_bearer(Some("Bearer other"), "secret").is_err());
    }

    #[test]
    fn test_matching_token_accepted() {
        assert!(validate_bearer(Some("Bearer secret"), "secret").is_ok());
    }
}
