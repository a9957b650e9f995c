//! The check/apply pipeline.
//!
//! `check` loads the profile (pulling its git source first when one is
//! configured), reads the live listings, and builds the plan. `apply` runs
//! that plan through the executor. Both hang off a [`RunContext`] so the
//! CLI and the daemon drive the same entry points.

use std::path::{Path, PathBuf};

use maestro_core::profile::{self, LocalSource, SourceStatus};
use maestro_core::settings::default_source_path_at;
use maestro_core::{Profile, Settings, UNSELECTED};
use maestro_exec::CommandRunner;
use maestro_verdi::{list_codes, list_computers};

use crate::apply::{apply_plan, ApplySummary};
use crate::compare::CompareOptions;
use crate::error::ReconcileError;
use crate::plan::{build_plan, LiveExports, PlanReport};
use crate::source::GitSource;
use crate::ssh::check_ssh_config;

/// Selection key that gates installs.
pub const GRANT_KEY: &str = "grant";

/// Everything one reconcile run needs.
pub struct RunContext<'a> {
    pub runner: &'a dyn CommandRunner,
    /// Home directory the settings store and default paths hang off.
    pub home: PathBuf,
    /// Client SSH config location, normally `<home>/.ssh/config`.
    pub ssh_path: PathBuf,
    pub settings: Settings,
    pub options: CompareOptions,
}

impl<'a> RunContext<'a> {
    pub fn new(runner: &'a dyn CommandRunner, home: &Path, settings: Settings) -> Self {
        Self {
            runner,
            home: home.to_path_buf(),
            ssh_path: home.join(".ssh").join("config"),
            settings,
            options: CompareOptions::default(),
        }
    }

    /// `new` against the live home directory and the stored settings.
    /// Tests build contexts explicitly instead.
    pub fn from_env(runner: &'a dyn CommandRunner) -> Result<Self, ReconcileError> {
        let home = dirs::home_dir().ok_or(maestro_core::SettingsError::HomeNotFound)?;
        let settings = maestro_core::settings::load_at(&home)?;
        Ok(Self::new(runner, &home, settings))
    }

    /// The grant selection, when a real one has been made.
    pub fn selected_grant(&self) -> Option<&str> {
        self.settings
            .selections
            .get(GRANT_KEY)
            .map(String::as_str)
            .filter(|grant| *grant != UNSELECTED)
    }

    /// Load and normalize the profile named by the settings, consulting the
    /// configured git source first.
    pub fn load_profile(&self) -> Result<(Profile, SourceStatus), ReconcileError> {
        let loaded = match &self.settings.source {
            Some(spec) => {
                let branch = spec.branch.as_deref().unwrap_or("main");
                let checkout = spec
                    .path
                    .clone()
                    .unwrap_or_else(|| default_source_path_at(&self.home));
                let source = GitSource::new(self.runner, &spec.repo, branch, &checkout);
                profile::load(&self.settings.profile, &self.settings.selections, &source)?
            }
            None => profile::load(
                &self.settings.profile,
                &self.settings.selections,
                &LocalSource,
            )?,
        };
        if loaded.source == SourceStatus::Refreshed {
            tracing::warn!("profile source was refreshed; review the incoming changes");
        }
        Ok((loaded.profile, loaded.source))
    }

    /// Build the plan for the current registry without touching anything.
    pub fn check(&self) -> Result<CheckReport, ReconcileError> {
        let (profile, source) = self.load_profile()?;

        let computers = list_computers(self.runner)?;
        let codes = list_codes(self.runner)?;
        let exports = LiveExports::new(self.runner);
        let mut report = build_plan(
            &profile,
            &computers,
            &codes,
            &exports,
            self.selected_grant(),
            &self.options,
        )?;
        report.plan.ssh = check_ssh_config(&profile, &self.ssh_path)?;

        Ok(CheckReport {
            profile,
            source,
            report,
        })
    }

    /// Check, then apply whatever the plan asks for.
    ///
    /// An in-sync plan still goes through the executor: current codes may
    /// carry a uenv verification, and the custom command groups run every
    /// apply.
    pub fn apply(&self) -> Result<ApplyReport, ReconcileError> {
        let check = self.check()?;
        if check.in_sync() {
            tracing::info!("registry matches the profile");
        }
        let summary = apply_plan(self.runner, &check.profile, &check.report.plan, &self.ssh_path)?;
        Ok(ApplyReport { check, summary })
    }
}

/// Outcome of a check: the loaded profile plus the plan built against it.
#[derive(Debug)]
pub struct CheckReport {
    pub profile: Profile,
    pub source: SourceStatus,
    pub report: PlanReport,
}

impl CheckReport {
    pub fn in_sync(&self) -> bool {
        self.report.plan.is_empty()
    }
}

/// Outcome of an apply: the check it was based on plus what the executor did.
#[derive(Debug)]
pub struct ApplyReport {
    pub check: CheckReport,
    pub summary: ApplySummary,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use chrono::Utc;
    use maestro_core::settings::{SourceSpec, SETTINGS_VERSION};
    use maestro_core::InstanceId;
    use maestro_exec::ScriptedRunner;

    use crate::plan::InstanceState;

    const PROFILE_YAML: &str = r##"
widgets:
  grant:
    - select
    - g1
grants:
  alpha:
    - g1
computers:
  alpha:
    setup:
      hostname: alpha.example.org
      transport: core.ssh
      scheduler: core.slurm
      shebang: "#!/bin/bash"
      work_dir: /scratch/{username}/aiida
      mpirun_command: srun -n {tot_num_mpiprocs}
      mpiprocs_per_machine: 72
      default_memory_per_machine: 64000
      prepend_text: "#SBATCH --account={account}"
    config:
      username: "{username}"
      port: 22
      look_for_keys: true
      key_filename: "~/.ssh/key"
      timeout: 60
      allow_agent: true
      compress: true
      gss_auth: false
      gss_kex: false
      gss_deleg_creds: false
      gss_host: ""
      load_system_host_keys: true
      key_policy: AutoAddPolicy
      use_login_shell: true
      safe_interval: 30.0
codes:
  pw:
    computer: alpha
    label: pw-7.4
    filepath_executable: /usr/bin/pw.x
    default_calc_job_plugin: quantumespresso.pw
"##;

    fn settings_for(profile: &Path) -> Settings {
        let now = Utc::now();
        Settings {
            version: SETTINGS_VERSION,
            profile: profile.to_path_buf(),
            source: None,
            selections: BTreeMap::from([("grant".to_owned(), "g1".to_owned())]),
            created_at: now,
            updated_at: now,
        }
    }

    fn seeded_home() -> (tempfile::TempDir, PathBuf) {
        let home = tempfile::tempdir().expect("tempdir");
        let profile_path = home.path().join("profile.yaml");
        std::fs::write(&profile_path, PROFILE_YAML).expect("write profile");
        (home, profile_path)
    }

    #[test]
    fn selected_grant_ignores_the_sentinel() {
        let (home, profile_path) = seeded_home();
        let runner = ScriptedRunner::new();
        let mut ctx = RunContext::new(&runner, home.path(), settings_for(&profile_path));
        assert_eq!(ctx.selected_grant(), Some("g1"));

        ctx.settings
            .selections
            .insert("grant".into(), UNSELECTED.into());
        assert_eq!(ctx.selected_grant(), None);

        ctx.settings.selections.clear();
        assert_eq!(ctx.selected_grant(), None);
    }

    #[test]
    fn check_plans_installs_for_a_fresh_registry() {
        let (home, profile_path) = seeded_home();
        let runner = ScriptedRunner::new();
        let ctx = RunContext::new(&runner, home.path(), settings_for(&profile_path));

        let check = ctx.check().expect("check");
        assert!(!check.in_sync());
        assert_eq!(check.source, SourceStatus::Current);

        let alpha = InstanceId::from("alpha_g1");
        assert_eq!(check.report.states[&alpha], InstanceState::Absent);
        let computer = check.report.plan.computers[&alpha];
        assert!(computer.install && !computer.hide);
        let code = check.report.plan.codes[&maestro_core::Label::from("pw-7.4@alpha_g1")];
        assert!(code.install);
        assert!(check.report.plan.ssh.is_none());
    }

    #[test]
    fn git_source_pull_is_surfaced_as_refreshed() {
        let (home, profile_path) = seeded_home();
        let checkout = home.path().join("source");
        std::fs::create_dir_all(checkout.join(".git")).expect("seed checkout");

        let mut settings = settings_for(&profile_path);
        settings.source = Some(SourceSpec {
            repo: "git@github.com:acme/hpc-profiles.git".into(),
            branch: None,
            path: Some(checkout),
        });
        let runner = ScriptedRunner::new()
            .respond("rev-parse HEAD", "4be9cafe")
            .respond("ls-remote origin main", "77aa90ff\trefs/heads/main")
            .respond("pull origin main", "Updating 4be9cafe..77aa90ff");
        let ctx = RunContext::new(&runner, home.path(), settings);

        let check = ctx.check().expect("check");
        assert_eq!(check.source, SourceStatus::Refreshed);
        assert!(runner.position_of("ls-remote origin main").is_some());
    }

    #[test]
    fn apply_registers_computers_before_their_codes() {
        let (home, profile_path) = seeded_home();
        let runner = ScriptedRunner::new();
        let ctx = RunContext::new(&runner, home.path(), settings_for(&profile_path));

        let applied = ctx.apply().expect("apply");
        assert!(applied.summary.ok());
        assert!(applied
            .summary
            .applied
            .contains(&"computer alpha_g1".to_owned()));
        assert!(applied
            .summary
            .applied
            .contains(&"code pw-7.4@alpha_g1".to_owned()));

        let setup = runner
            .position_of("computer setup --label alpha_g1")
            .expect("setup ran");
        let create = runner
            .position_of("code create core.code.installed --computer alpha_g1")
            .expect("create ran");
        assert!(setup < create);
    }
}
