//! Error type for the auditor.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading a provenance snapshot.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse snapshot {path}: {message}")]
    Snapshot { path: PathBuf, message: String },
}
