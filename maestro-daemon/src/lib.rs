//! Daemon runtime: reconcile tick + declaration watcher + socket server.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod systemd;

pub use error::DaemonError;
pub use protocol::{
    request_apply, request_audit, request_check, request_status, request_stop, send_request,
    AuditArgs, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, PassSummary};
pub use systemd::{generate_unit, install as install_systemd, uninstall as uninstall_systemd};
