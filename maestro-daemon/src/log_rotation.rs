//! Size-based rotation for the daemon log files.
//!
//! `daemon.log` and `daemon-err.log` roll over at 10 MiB into numbered
//! backups (`daemon.log.1` newest … `daemon.log.5` oldest); the oldest
//! copy is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size threshold that triggers a rotation.
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Number of numbered backups kept per log file.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size reached `max_bytes`.
///
/// Returns `true` when a rotation happened. A missing file is not an
/// error; the daemon may simply not have logged yet.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    shift_backups(log_path, max_files)?;
    fs::rename(log_path, backup_path(log_path, 1))?;

    // The daemon keeps the path open via its service redirection, so leave
    // a fresh empty file in place.
    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Rotate both daemon logs under `home`. Failures are logged, never raised.
pub fn rotate_logs(home: &Path) {
    for log_path in [
        crate::paths::stdout_log_path(home),
        crate::paths::stderr_log_path(home),
    ] {
        match rotate_if_needed(&log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// Drop the oldest backup and move every remaining one up a slot.
fn shift_backups(base: &Path, max_files: usize) -> io::Result<()> {
    let oldest = backup_path(base, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = backup_path(base, n);
        if src.exists() {
            fs::rename(&src, backup_path(base, n + 1))?;
        }
    }
    Ok(())
}

fn backup_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("daemon.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filled_log(dir: &TempDir, name: &str, bytes: usize) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, vec![b'x'; bytes]).expect("write log");
        path
    }

    #[test]
    fn small_file_is_left_alone() {
        let dir = TempDir::new().expect("tempdir");
        let log = filled_log(&dir, "daemon.log", 512);
        assert!(!rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).expect("rotate"));
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn oversized_file_rolls_into_a_fresh_empty_log() {
        let dir = TempDir::new().expect("tempdir");
        let log = filled_log(&dir, "daemon.log", MAX_LOG_BYTES as usize);
        assert!(rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).expect("rotate"));

        assert_eq!(fs::metadata(&log).expect("fresh log").len(), 0);
        let backup = backup_path(&log, 1);
        assert_eq!(
            fs::metadata(&backup).expect("backup").len(),
            MAX_LOG_BYTES,
            "backup carries the old content"
        );
    }

    #[test]
    fn backups_shift_up_and_the_oldest_drops() {
        let dir = TempDir::new().expect("tempdir");
        let log = dir.path().join("daemon.log");
        for n in 1..=MAX_ROTATED_FILES {
            fs::write(backup_path(&log, n), format!("gen-{n}")).expect("seed backup");
        }
        filled_log(&dir, "daemon.log", MAX_LOG_BYTES as usize);

        assert!(rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).expect("rotate"));

        // Old .1 became .2, old .4 became .5, old .5 is gone.
        assert_eq!(
            fs::read_to_string(backup_path(&log, 2)).expect("read .2"),
            "gen-1"
        );
        assert_eq!(
            fs::read_to_string(backup_path(&log, MAX_ROTATED_FILES)).expect("read .5"),
            format!("gen-{}", MAX_ROTATED_FILES - 1)
        );
        assert!(!backup_path(&log, MAX_ROTATED_FILES + 1).exists());
    }

    #[test]
    fn missing_log_is_not_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let log = dir.path().join("daemon.log");
        assert!(!rotate_if_needed(&log, MAX_LOG_BYTES, MAX_ROTATED_FILES).expect("rotate"));
    }
}
