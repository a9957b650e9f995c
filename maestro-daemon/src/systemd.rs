//! Systemd user-unit management for the daemon.
//!
//! `install` writes `~/.config/systemd/user/maestro-daemon.service` and
//! enables + restarts it through `systemctl --user`; `uninstall` reverses
//! both. Daemon output goes to the files under `~/.maestro/logs` so the
//! in-process rotation keeps working.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::{logs_dir, run_dir, socket_path, systemd_user_dir, unit_path, DAEMON_LABEL};

/// Render the user unit for the daemon started from `binary_path`.
pub fn generate_unit(binary_path: &Path, home: &Path) -> String {
    let stdout = crate::paths::stdout_log_path(home).display().to_string();
    let stderr = crate::paths::stderr_log_path(home).display().to_string();
    let binary = binary_path.display().to_string();

    format!(
        "[Unit]\n\
         Description=maestro resource reconcile daemon\n\
         \n\
         [Service]\n\
         ExecStart={binary} daemon start\n\
         Restart=always\n\
         RestartSec=5\n\
         StandardOutput=append:{stdout}\n\
         StandardError=append:{stderr}\n\
         \n\
         [Install]\n\
         WantedBy=default.target\n"
    )
}

/// Install the unit and start the service for the current user.
pub fn install(home: &Path, binary_path: &Path) -> Result<PathBuf, DaemonError> {
    ensure_linux()?;

    for dir in [systemd_user_dir(home), logs_dir(home), run_dir(home)] {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
    }

    let unit = unit_path(home);
    fs::write(&unit, generate_unit(binary_path, home)).map_err(|e| io_err(&unit, e))?;

    run_systemctl(&["daemon-reload"], false)?;
    run_systemctl(&["enable", DAEMON_LABEL], false)?;
    run_systemctl(&["restart", DAEMON_LABEL], false)?;

    Ok(unit)
}

/// Stop and disable the service, then remove its unit file.
pub fn uninstall(home: &Path) -> Result<(), DaemonError> {
    ensure_linux()?;

    let unit = unit_path(home);
    if unit.exists() {
        let _ = run_systemctl(&["disable", "--now", DAEMON_LABEL], true);
        fs::remove_file(&unit).map_err(|e| io_err(&unit, e))?;
        let _ = run_systemctl(&["daemon-reload"], true);
    }

    let socket = socket_path(home);
    if socket.exists() {
        let _ = fs::remove_file(socket);
    }

    Ok(())
}

#[cfg(target_os = "linux")]
fn ensure_linux() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn ensure_linux() -> Result<(), DaemonError> {
    Err(DaemonError::Systemd(
        "systemd management is only supported on Linux".to_string(),
    ))
}

fn run_systemctl(args: &[&str], ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new("systemctl")
        .arg("--user")
        .args(args)
        .output()
        .map_err(|e| io_err("systemctl", e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Err(DaemonError::Systemd(format!(
        "systemctl --user {} failed (status {}): {} {}",
        args.join(" "),
        output.status,
        stdout,
        stderr
    )))
}
