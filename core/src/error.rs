use thiserror::Error;

/// Result type alias for coordination operations
pub type Result<T> = std::result::Result<T, CoordError>;

/// Error kinds surfaced at component boundaries.
///
/// Each kind maps to an HTTP status for the API layer; some kinds are
/// deliberately never surfaced there (the claim coordinator converts
/// `Conflict` and internal failures into "no task", and the lifecycle
/// controller converts `Dependency` into fallback behavior).
///
/// # Examples
///
/// ```rust
/// use cortex_core::error::CoordError;
///
/// let err = CoordError::workflow_not_found("WID00000042");
/// assert!(err.is_not_found());
/// assert_eq!(err.status_code(), 404);
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordError {
    /// Entity absent; mapped to HTTP 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// Structural failure of input or of an LLM output; HTTP 422
    #[error("Validation error: {0}")]
    Validation(String),

    /// Mutation contradicts current state (e.g. claim lost the race)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// File lock could not be acquired within the caller's timeout
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// External provider (LLM) unavailable after retries
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// Database operation error
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordError {
    /// Create a not found error for a workflow id
    pub fn workflow_not_found(workflow_id: &str) -> Self {
        Self::NotFound(format!("Workflow {workflow_id} not found"))
    }

    /// Create a not found error for a task step id
    pub fn task_not_found(step_id: &str) -> Self {
        Self::NotFound(format!("Task {step_id} not found"))
    }

    /// Create a not found error for a project
    pub fn project_not_found(project_id: &str) -> Self {
        Self::NotFound(format!("Project {project_id} not found"))
    }

    /// Create a validation error for an empty field
    pub fn empty_field(field: &str) -> Self {
        Self::Validation(format!("Field '{field}' cannot be empty"))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordError::NotFound(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, CoordError::Validation(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoordError::Conflict(_))
    }

    /// HTTP status the API layer maps this kind to when it is surfaced
    pub fn status_code(&self) -> u16 {
        match self {
            CoordError::NotFound(_) => 404,
            CoordError::Validation(_) => 422,
            CoordError::Conflict(_) => 409,
            CoordError::LockTimeout(_) => 423,
            CoordError::Dependency(_) => 502,
            CoordError::Database(_) => 500,
            CoordError::Configuration(_) => 500,
            CoordError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let err = CoordError::workflow_not_found("WID00000001");
        assert_eq!(
            err,
            CoordError::NotFound("Workflow WID00000001 not found".to_string())
        );
        assert!(err.is_not_found());
        assert_eq!(err.status_code(), 404);

        let err = CoordError::task_not_found("TID0000000007");
        assert!(err.is_not_found());

        let err = CoordError::empty_field("user_request");
        assert!(err.is_validation());
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_error_display() {
        let err = CoordError::Conflict("claim lost".to_string());
        assert_eq!(format!("{err}"), "Conflict: claim lost");
        assert_eq!(err.status_code(), 409);

        let err = CoordError::Dependency("LLM unreachable".to_string());
        assert_eq!(format!("{err}"), "Dependency error: LLM unreachable");
    }
}
