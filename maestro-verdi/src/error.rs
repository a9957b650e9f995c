//! Error types for maestro-verdi.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from talking to `verdi`.
#[derive(Debug, Error)]
pub enum VerdiError {
    /// A `verdi` invocation exited non-zero. Carries the rendered command
    /// and its captured diagnostic output.
    #[error("`{command}` failed: {output}")]
    Command { command: String, output: String },

    /// Underlying I/O failure reading an export file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An exported attribute file did not parse as YAML.
    #[error("failed to parse export at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
