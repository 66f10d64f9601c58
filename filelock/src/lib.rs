//! File-access coordination for concurrent worker processes.
//!
//! Prevents concurrent file conflicts with two layers, both required: a
//! process-local registry of holders per canonical path, and host-level OS
//! advisory locks on the opened descriptor (shared for `read`, exclusive
//! for `write`/`exclusive`). An optional database record store mirrors
//! acquisitions for cross-process observers.

mod error;
mod infer;
mod manager;

pub use error::FileLockError;
pub use infer::{classify_access_type, extract_file_paths};
pub use manager::{FileAccessManager, FileLockGuard, LockHolder, DEFAULT_SWEEP_AGE_HOURS};
