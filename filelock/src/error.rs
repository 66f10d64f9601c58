use std::path::PathBuf;
use std::time::Duration;

use cortex_core::{error::CoordError, models::AccessType};
use thiserror::Error;

/// Errors raised by file-lock acquisition.
///
/// `Timeout` is distinguished so that callers can downgrade it (task-derived
/// locks skip the lock with a warning; explicit user-requested locks fail).
#[derive(Error, Debug)]
pub enum FileLockError {
    /// The lock could not be acquired within the caller's timeout
    #[error("Failed to acquire {access_type} lock on {path} within {timeout:?}")]
    Timeout {
        path: PathBuf,
        access_type: AccessType,
        timeout: Duration,
    },

    /// Genuine OS-level lock failure
    #[error("Lock error on {path}: {message}")]
    Lock { path: PathBuf, message: String },

    /// Filesystem error outside the lock call itself
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileLockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FileLockError::Timeout { .. })
    }
}

impl From<FileLockError> for CoordError {
    fn from(err: FileLockError) -> Self {
        match err {
            FileLockError::Timeout { .. } => CoordError::LockTimeout(err.to_string()),
            _ => CoordError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_lock_timeout() {
        let err = FileLockError::Timeout {
            path: PathBuf::from("/tmp/x"),
            access_type: AccessType::Write,
            timeout: Duration::from_secs(5),
        };
        assert!(err.is_timeout());

        let coord: CoordError = err.into();
        assert!(matches!(coord, CoordError::LockTimeout(_)));
        assert_eq!(coord.status_code(), 423);
    }

    #[test]
    fn test_lock_error_maps_to_internal() {
        let err = FileLockError::Lock {
            path: PathBuf::from("/tmp/x"),
            message: "flock failed".to_string(),
        };
        let coord: CoordError = err.into();
        assert!(matches!(coord, CoordError::Internal(_)));
    }
}
