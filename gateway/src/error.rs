use cortex_core::error::CoordError;
use thiserror::Error;

/// Errors surfaced by the LLM gateway.
///
/// Retry policy: timeouts, HTTP 5xx, validation failures, and unclassified
/// errors are retried (validation with a repair prompt); HTTP 4xx and
/// configuration errors are not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The model call exceeded its per-call timeout
    #[error("LLM request timed out: {0}")]
    Timeout(String),

    /// Non-success HTTP response from the provider
    #[error("LLM HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// Output failed to parse or did not match the declared schema
    #[error("LLM output validation failed: {0}")]
    Validation(String),

    /// Missing or invalid gateway configuration
    #[error("LLM configuration error: {0}")]
    Configuration(String),

    /// Anything else (connection resets, malformed envelopes, ...)
    #[error("LLM error: {0}")]
    Other(String),
}

impl GatewayError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout(_) => true,
            GatewayError::Http { status, .. } => *status >= 500,
            GatewayError::Validation(_) => true,
            GatewayError::Configuration(_) => false,
            GatewayError::Other(_) => true,
        }
    }
}

impl From<GatewayError> for CoordError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Configuration(msg) => CoordError::Configuration(msg),
            GatewayError::Validation(msg) => CoordError::Validation(msg),
            other => CoordError::Dependency(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(GatewayError::Timeout("t".into()).is_retryable());
        assert!(GatewayError::Http {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!GatewayError::Http {
            status: 401,
            message: "unauthorized".into()
        }
        .is_retryable());
        assert!(GatewayError::Validation("bad json".into()).is_retryable());
        assert!(!GatewayError::Configuration("no key".into()).is_retryable());
        assert!(GatewayError::Other("reset".into()).is_retryable());
    }

    #[test]
    fn test_conversion_to_coord_error() {
        let err: CoordError = GatewayError::Timeout("t".into()).into();
        assert!(matches!(err, CoordError::Dependency(_)));

        let err: CoordError = GatewayError::Configuration("no key".into()).into();
        assert!(matches!(err, CoordError::Configuration(_)));
    }
}
