//! Error types for the reconcile pipeline.

use thiserror::Error;

/// Anything that can go wrong between loading a profile and applying a plan.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Profile load, substitution, or validation failure.
    #[error(transparent)]
    Profile(#[from] maestro_core::ProfileError),

    /// Settings store failure (selections, profile location).
    #[error(transparent)]
    Settings(#[from] maestro_core::SettingsError),

    /// A `verdi` invocation failed or its output did not parse.
    #[error(transparent)]
    Verdi(#[from] maestro_verdi::VerdiError),

    /// Underlying I/O failure (ssh config, report files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization failure while rendering a plan or report.
    #[error("YAML serialization error: {0}")]
    Encode(#[from] serde_yaml::Error),

    /// A configured shell command exited non-zero.
    #[error("command `{command}` in group `{group}` failed: {output}")]
    CustomCommand {
        group: String,
        command: String,
        output: String,
    },

    /// Remote uenv image management failed.
    #[error("uenv on {host}: {message}")]
    Uenv { host: String, message: String },

    /// A plan asked to install an instance the profile no longer declares.
    #[error("no declaration found for `{0}`")]
    MissingDeclaration(String),
}
