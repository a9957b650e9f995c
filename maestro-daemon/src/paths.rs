use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DAEMON_LABEL: &str = "maestro-daemon";
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
/// Gap between periodic reconcile checks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub const DAEMON_STDOUT_LOG: &str = "daemon.log";
pub const DAEMON_STDERR_LOG: &str = "daemon-err.log";
pub const DAEMON_SOCKET: &str = "maestro.sock";
/// Provenance graph dump the audit command reads.
pub const SNAPSHOT_FILE: &str = "provenance.json";

pub fn maestro_root(home: &Path) -> PathBuf {
    home.join(".maestro")
}

pub fn run_dir(home: &Path) -> PathBuf {
    maestro_root(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    maestro_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

pub fn snapshot_path(home: &Path) -> PathBuf {
    maestro_root(home).join(SNAPSHOT_FILE)
}

pub fn systemd_user_dir(home: &Path) -> PathBuf {
    home.join(".config").join("systemd").join("user")
}

pub fn unit_path(home: &Path) -> PathBuf {
    systemd_user_dir(home).join(format!("{DAEMON_LABEL}.service"))
}
