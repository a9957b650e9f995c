//! Git-backed profile source.
//!
//! A profile can live in a tracked git checkout instead of a plain local
//! file. Before each load the checkout is cloned on first use, then its
//! `HEAD` is compared against the remote branch head and pulled when
//! behind. A refresh is reported to the caller so the run output can point
//! at the changed profile.

use std::path::{Path, PathBuf};

use maestro_core::profile::{SourceCheck, SourceStatus};
use maestro_core::ProfileError;
use maestro_exec::{CommandRunner, CommandSpec};

/// Tracks one branch of a remote repository in a local checkout.
pub struct GitSource<'a> {
    runner: &'a dyn CommandRunner,
    url: String,
    branch: String,
    checkout: PathBuf,
}

impl<'a> GitSource<'a> {
    pub fn new(runner: &'a dyn CommandRunner, url: &str, branch: &str, checkout: &Path) -> Self {
        Self {
            runner,
            url: url.to_owned(),
            branch: branch.to_owned(),
            checkout: checkout.to_path_buf(),
        }
    }

    fn clone_repo(&self) -> Result<(), ProfileError> {
        let target = self.checkout.display().to_string();
        let spec = CommandSpec::local([
            "git",
            "clone",
            "-b",
            self.branch.as_str(),
            self.url.as_str(),
            target.as_str(),
        ]);
        let outcome = self.runner.run(&spec);
        if outcome.success {
            Ok(())
        } else {
            Err(ProfileError::Source(format!(
                "`{}` failed: {}",
                spec.rendered(),
                outcome.output
            )))
        }
    }

    /// Run `git -C <checkout> <args>` and return its output.
    fn git(&self, args: &[&str]) -> Result<String, ProfileError> {
        let checkout = self.checkout.display().to_string();
        let mut argv = vec!["git", "-C", checkout.as_str()];
        argv.extend_from_slice(args);
        let spec = CommandSpec::local(argv);
        let outcome = self.runner.run(&spec);
        if outcome.success {
            Ok(outcome.output)
        } else {
            Err(ProfileError::Source(format!(
                "`{}` failed: {}",
                spec.rendered(),
                outcome.output
            )))
        }
    }
}

impl SourceCheck for GitSource<'_> {
    fn ensure_current(&self) -> Result<SourceStatus, ProfileError> {
        if !self.checkout.join(".git").is_dir() {
            tracing::info!(
                url = %self.url,
                checkout = %self.checkout.display(),
                "cloning profile source"
            );
            self.clone_repo()?;
            return Ok(SourceStatus::Refreshed);
        }

        let local = self.git(&["rev-parse", "HEAD"])?;
        let remote_head = self.git(&["ls-remote", "origin", &self.branch])?;
        let remote = remote_head.split_whitespace().next().unwrap_or_default();
        if local.trim() == remote {
            return Ok(SourceStatus::Current);
        }

        tracing::warn!(branch = %self.branch, "profile checkout behind remote, pulling");
        let pulled = self.git(&["pull", "origin", &self.branch])?;
        if pulled.contains("Already up to date") {
            Ok(SourceStatus::Current)
        } else {
            Ok(SourceStatus::Refreshed)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
