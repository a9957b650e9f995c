//! Error types for maestro-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors arising while loading and normalizing the declarative profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load — includes file path and line context.
    #[error("failed to parse profile at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The profile YAML file did not exist at the expected path.
    #[error("profile not found at {path}")]
    ProfileNotFound { path: PathBuf },

    /// A widget key has no selection, or the selection is the sentinel.
    #[error("no value selected for '{key}'; run `maestro select set {key} <value>`")]
    MissingSelection { key: String },

    /// A code definition references a computer key that does not exist.
    #[error("code '{code}' references unknown computer '{computer}'")]
    UnknownComputer { code: String, computer: String },

    /// The profile source collaborator reported a failure.
    #[error("profile source check failed: {0}")]
    Source(String),
}

/// Errors arising from the settings store under `~/.maestro/`.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.maestro/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The settings file did not exist at the expected path.
    #[error("settings not found at {path}; run `maestro init` first")]
    SettingsNotFound { path: PathBuf },
}
