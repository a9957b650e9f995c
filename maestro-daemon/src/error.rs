use std::path::PathBuf;

use thiserror::Error;

/// Error surface for daemon runtime, protocol, and systemd management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("settings error: {0}")]
    Settings(#[from] maestro_core::SettingsError),

    #[error("reconcile error: {0}")]
    Reconcile(#[from] maestro_reconcile::ReconcileError),

    #[error("audit error: {0}")]
    Audit(#[from] maestro_audit::AuditError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("daemon protocol error: {0}")]
    Protocol(String),

    #[error("daemon is not running (socket missing: {socket})")]
    DaemonNotRunning { socket: PathBuf },

    #[error("busy: a pass is already in flight")]
    Busy,

    #[error("systemd error: {0}")]
    Systemd(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
