//! Plan execution: ordered `verdi` calls plus the SSH config write, uenv
//! image checks, and post-apply custom commands.
//!
//! Stage order is ssh config → computers → codes → uenv images → custom
//! commands. The SSH write happens first because every later stage may need
//! working host access; its failure aborts the whole apply. Registry
//! failures are collected per entry and do not stop siblings. Within one
//! entry the steps run rename → hide → install and short-circuit on the
//! first error.

use std::path::Path;

use maestro_core::text::archive_label;
use maestro_core::{InstanceId, Label, Profile};
use maestro_exec::CommandRunner;
use maestro_verdi::verbs::{
    code_create, code_hide, code_relabel, computer_configure, computer_disable, computer_relabel,
    computer_setup, DEFAULT_USER,
};

use crate::custom::{run_custom_commands, CommandReport};
use crate::error::ReconcileError;
use crate::plan::{Rename, UpdateDirective, UpdatePlan};
use crate::ssh::write_ssh_config;
use crate::uenv::{ensure_images, required_images};

/// What an apply run did, stage by stage.
#[derive(Debug, Default, serde::Serialize)]
pub struct ApplySummary {
    /// Entries whose directives all succeeded, in apply order.
    pub applied: Vec<String>,
    /// Failures as `entry: error` lines, in apply order.
    pub failed: Vec<String>,
    /// `(host, image)` pairs that were verified or pulled.
    pub uenvs: Vec<(String, String)>,
    /// Per-group custom command outcomes.
    pub commands: Vec<CommandReport>,
}

impl ApplySummary {
    pub fn ok(&self) -> bool {
        self.failed.is_empty() && self.commands.iter().all(CommandReport::ok)
    }
}

/// Apply `plan` against the live registry.
///
/// Only the SSH config write is fatal; everything else degrades into the
/// summary's `failed` list. A uenv failure skips the custom commands, which
/// routinely depend on the images being in place.
pub fn apply_plan(
    runner: &dyn CommandRunner,
    profile: &Profile,
    plan: &UpdatePlan,
    ssh_path: &Path,
) -> Result<ApplySummary, ReconcileError> {
    let mut summary = ApplySummary::default();

    if let Some(directive) = &plan.ssh {
        write_ssh_config(profile, ssh_path, directive)?;
        summary.applied.push("ssh config".into());
    }

    for (instance, directive) in &plan.computers {
        match apply_computer(runner, profile, instance, directive) {
            Ok(true) => summary.applied.push(format!("computer {instance}")),
            Ok(false) => {}
            Err(err) => {
                tracing::error!(%instance, "computer update failed: {err}");
                summary.failed.push(format!("computer {instance}: {err}"));
            }
        }
    }

    for (label, directive) in &plan.codes {
        match apply_code(runner, profile, label, directive) {
            Ok(true) => summary.applied.push(format!("code {label}")),
            Ok(false) => {}
            Err(err) => {
                tracing::error!(%label, "code update failed: {err}");
                summary.failed.push(format!("code {label}: {err}"));
            }
        }
    }

    summary.uenvs = required_images(profile, plan);
    if let Err(err) = ensure_images(runner, &summary.uenvs) {
        tracing::error!("uenv stage failed: {err}");
        summary.failed.push(format!("uenv: {err}"));
        return Ok(summary);
    }

    summary.commands = run_custom_commands(runner, profile);
    Ok(summary)
}

/// Returns `Ok(true)` when the directive did something.
fn apply_computer(
    runner: &dyn CommandRunner,
    profile: &Profile,
    instance: &InstanceId,
    directive: &UpdateDirective,
) -> Result<bool, ReconcileError> {
    if directive.is_noop() {
        return Ok(false);
    }

    // After a rename the hide must address the archived label.
    let mut target = Label::from(instance.as_str());
    if directive.rename == Rename::Archive {
        let archived = Label::from(archive_label(instance.as_str()));
        computer_relabel(runner, &target, &archived)?;
        target = archived;
    }
    if directive.hide {
        computer_disable(runner, &target, DEFAULT_USER)?;
    }
    if directive.install {
        let def = profile
            .computers
            .get(instance.name())
            .ok_or_else(|| ReconcileError::MissingDeclaration(instance.to_string()))?;
        computer_setup(runner, instance, &def.setup)?;
        computer_configure(runner, instance, &def.setup, &def.config)?;
    }
    Ok(true)
}

fn apply_code(
    runner: &dyn CommandRunner,
    profile: &Profile,
    label: &Label,
    directive: &UpdateDirective,
) -> Result<bool, ReconcileError> {
    if directive.is_noop() {
        return Ok(false);
    }

    if let Rename::ByPk(pk) = directive.rename {
        code_relabel(runner, pk, &archive_label(label.as_str()))?;
        if directive.hide {
            code_hide(runner, pk)?;
        }
    }
    if directive.install {
        let (name, computer) = label
            .as_str()
            .split_once('@')
            .ok_or_else(|| ReconcileError::MissingDeclaration(label.to_string()))?;
        let def = profile
            .code_for(label.as_str())
            .ok_or_else(|| ReconcileError::MissingDeclaration(label.to_string()))?;
        code_create(runner, &InstanceId::from(computer), name, def)?;
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
