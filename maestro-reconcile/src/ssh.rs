//! Client SSH config: verify that every declared computer is reachable
//! through the file and rewrite the whole file from the profile when not.
//!
//! The check looks for each computer's hostname in the file text, plus a
//! `Host <proxy>` stanza when the computer tunnels through a proxy jump.
//! The writer emits one stanza per `ssh_config` entry, so a freshly written
//! file always passes. An existing file that fails the check is backed up
//! under a timestamped name before the rewrite.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use maestro_core::text::{archive_label, to_pascal_case};
use maestro_core::Profile;

use crate::compare::value_text;
use crate::error::ReconcileError;
use crate::plan::SshDirective;

/// Check the file at `path` against the declared computers.
///
/// Returns `None` when nothing needs to happen: the profile declares no
/// `ssh_config` stanzas to regenerate from, or every computer passes. A
/// missing file flags every computer and yields `rename: false` (nothing to
/// back up).
pub fn check_ssh_config(
    profile: &Profile,
    path: &Path,
) -> Result<Option<SshDirective>, ReconcileError> {
    if profile.ssh_config.is_empty() {
        return Ok(None);
    }
    let exists = path.is_file();
    let content = if exists {
        fs::read_to_string(path)?
    } else {
        String::new()
    };

    let mut hosts = BTreeSet::new();
    for (name, def) in &profile.computers {
        let mut ok = exists && content.contains(&def.setup.hostname);
        if let Some(proxy) = def.config.proxy_jump.as_deref().filter(|p| !p.is_empty()) {
            ok = ok && content.contains(&format!("Host {proxy}"));
        }
        if !ok {
            hosts.insert(name.clone());
        }
    }

    if hosts.is_empty() {
        Ok(None)
    } else {
        tracing::info!(path = %path.display(), flagged = hosts.len(), "ssh config incomplete");
        Ok(Some(SshDirective {
            rename: exists,
            hosts,
        }))
    }
}

/// Write every declared stanza to `path`, backing up an existing file first
/// when the directive asks for it. The containing directory is created with
/// mode 0700 and the file ends up with mode 0600.
pub fn write_ssh_config(
    profile: &Profile,
    path: &Path,
    directive: &SshDirective,
) -> Result<(), ReconcileError> {
    if profile.ssh_config.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        restrict(parent, 0o700)?;
    }
    if directive.rename && path.exists() {
        let backup = path.with_file_name(archive_label("config"));
        tracing::info!(backup = %backup.display(), "backing up ssh config");
        fs::rename(path, &backup)?;
    }

    let mut rendered = String::new();
    for (host, block) in &profile.ssh_config {
        rendered.push_str(&format!("Host {host}\n"));
        for (key, value) in block {
            rendered.push_str(&format!("  {} {}\n", to_pascal_case(key), value_text(value)));
        }
        rendered.push('\n');
    }
    fs::write(path, rendered)?;
    restrict(path, 0o600)?;
    tracing::info!(path = %path.display(), stanzas = profile.ssh_config.len(), "ssh config written");
    Ok(())
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
