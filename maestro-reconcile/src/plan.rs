//! Plan construction: declared profile × observed listings → update plan.
//!
//! The planner never mutates anything. Live attribute exports arrive through
//! the [`ExportSource`] seam so the decision table can be driven from
//! in-memory fixtures; the real implementation shells out through
//! `verdi … export` per entry.

use std::collections::{BTreeMap, BTreeSet};

use maestro_core::types::attribute_entries;
use maestro_core::{
    CodeDef, CodeListing, ComputerDef, ComputerListing, InstanceId, Label, Pk, Profile,
};
use maestro_exec::CommandRunner;
use maestro_verdi::{ComputerExport, VerdiError};
use serde::Serialize;
use serde_yaml::Value;

use crate::compare::{compare_code, compare_computer, CompareOptions};
use crate::error::ReconcileError;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// How a superseded live entry is moved out of the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rename {
    /// Leave the label alone.
    #[default]
    No,
    /// Relabel under a timestamped archive label (computers).
    Archive,
    /// Relabel the entry addressed by this pk (codes).
    ByPk(Pk),
}

/// Update steps for one registry entry, applied rename → hide → install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct UpdateDirective {
    pub hide: bool,
    pub rename: Rename,
    pub install: bool,
    /// Entry is current, but its submission header references a uenv image
    /// that should still be verified on the remote side.
    pub check_uenv: bool,
}

impl UpdateDirective {
    /// True when the directive performs no registry mutation.
    pub fn is_noop(&self) -> bool {
        !self.hide && !self.install && self.rename == Rename::No
    }
}

/// Rewrite instruction for the client SSH config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshDirective {
    /// Back up the existing file under an archive name before writing.
    pub rename: bool,
    /// Computer keys whose host entries failed the check.
    pub hosts: BTreeSet<String>,
}

/// Everything `apply` would do, keyed by the entry it touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct UpdatePlan {
    pub computers: BTreeMap<InstanceId, UpdateDirective>,
    pub codes: BTreeMap<Label, UpdateDirective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshDirective>,
}

impl UpdatePlan {
    /// True when nothing would change: every directive is a no-op and the
    /// SSH config is already complete.
    pub fn is_empty(&self) -> bool {
        self.ssh.is_none()
            && self.computers.values().all(UpdateDirective::is_noop)
            && self.codes.values().all(UpdateDirective::is_noop)
    }
}

/// Where an instance stands relative to the live registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Absent,
    Inactive,
    ActiveStale,
    ActiveCurrent,
    Orphaned,
}

/// Plan plus the per-instance classification it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct PlanReport {
    pub plan: UpdatePlan,
    pub states: BTreeMap<InstanceId, InstanceState>,
}

// ---------------------------------------------------------------------------
// Export seam
// ---------------------------------------------------------------------------

/// Source of live attribute exports for the comparator.
pub trait ExportSource {
    fn computer(&self, label: &Label) -> Result<ComputerExport, VerdiError>;
    fn code(&self, label: &Label) -> Result<BTreeMap<String, Value>, VerdiError>;
}

/// The real thing: one `verdi … export` round trip per entry.
pub struct LiveExports<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> LiveExports<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }
}

impl ExportSource for LiveExports<'_> {
    fn computer(&self, label: &Label) -> Result<ComputerExport, VerdiError> {
        maestro_verdi::export_computer(self.runner, label)
    }

    fn code(&self, label: &Label) -> Result<BTreeMap<String, Value>, VerdiError> {
        maestro_verdi::export_code(self.runner, label)
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Classify every declared instance against the listings and derive the
/// update plan. `selected_grant` gates fresh installs: an absent or stale
/// instance is only (re)installed when its grant is the selected one, while
/// archival of superseded entries fires for every grant. Inactive computer
/// entries are archived and reinstalled unconditionally, and grant-less
/// instances are never auto-installed.
pub fn build_plan(
    profile: &Profile,
    computers: &ComputerListing,
    codes: &CodeListing,
    exports: &dyn ExportSource,
    selected_grant: Option<&str>,
    opts: &CompareOptions,
) -> Result<PlanReport, ReconcileError> {
    let mut report = PlanReport::default();
    plan_computers(profile, computers, exports, selected_grant, opts, &mut report)?;
    plan_codes(profile, computers, codes, exports, selected_grant, opts, &mut report)?;
    tracing::debug!(
        computers = report.plan.computers.len(),
        codes = report.plan.codes.len(),
        "plan built"
    );
    Ok(report)
}

fn plan_computers(
    profile: &Profile,
    computers: &ComputerListing,
    exports: &dyn ExportSource,
    selected_grant: Option<&str>,
    opts: &CompareOptions,
    report: &mut PlanReport,
) -> Result<(), ReconcileError> {
    for (name, def) in &profile.computers {
        for instance in profile.instances_of(name) {
            let gate = install_gate(&instance, selected_grant);
            let label = Label::from(instance.as_str());
            // A label listed both ways is treated as disabled.
            let (state, directive) = if computers.inactive.contains(&label) {
                (
                    InstanceState::Inactive,
                    Some(UpdateDirective {
                        rename: Rename::Archive,
                        install: true,
                        ..Default::default()
                    }),
                )
            } else if computers.active.contains(&label) {
                if computer_is_current(def, &instance, exports, opts)? {
                    (InstanceState::ActiveCurrent, None)
                } else {
                    (
                        InstanceState::ActiveStale,
                        Some(UpdateDirective {
                            hide: true,
                            rename: Rename::Archive,
                            install: gate,
                            ..Default::default()
                        }),
                    )
                }
            } else if gate {
                (
                    InstanceState::Absent,
                    Some(UpdateDirective {
                        install: true,
                        ..Default::default()
                    }),
                )
            } else {
                (InstanceState::Absent, None)
            };
            report.states.insert(instance.clone(), state);
            if let Some(directive) = directive {
                report.plan.computers.insert(instance, directive);
            }
        }
    }

    // Active entries no declared instance accounts for get hidden, nothing
    // more. Disabled strays are left as they are.
    let valid = declared_instances(profile);
    for label in &computers.active {
        if !valid.contains(label.as_str()) {
            let orphan = InstanceId::from(label.as_str());
            tracing::info!(computer = %orphan, "orphaned computer will be hidden");
            report.states.insert(orphan.clone(), InstanceState::Orphaned);
            report.plan.computers.insert(
                orphan,
                UpdateDirective {
                    hide: true,
                    ..Default::default()
                },
            );
        }
    }
    Ok(())
}

fn plan_codes(
    profile: &Profile,
    computers: &ComputerListing,
    codes: &CodeListing,
    exports: &dyn ExportSource,
    selected_grant: Option<&str>,
    opts: &CompareOptions,
    report: &mut PlanReport,
) -> Result<(), ReconcileError> {
    let valid = declared_instances(profile);
    for entry in &codes.active {
        if !valid.contains(entry.computer()) {
            tracing::info!(code = %entry.label, "orphaned code will be hidden");
            report.plan.codes.insert(
                entry.label.clone(),
                UpdateDirective {
                    hide: true,
                    rename: Rename::ByPk(entry.pk),
                    ..Default::default()
                },
            );
        }
    }

    for def in profile.codes.values() {
        for instance in profile.instances_of(&def.computer) {
            let full = Label::from(format!("{}@{}", def.label, instance));
            let active_pk = codes.active_pk(full.as_str());
            let inactive_pk = codes.inactive_pk(full.as_str());

            let directive = match report.plan.computers.get(&instance) {
                // Computer is being (re)installed: any live entry is
                // relabeled out of the way and the code follows the rebuild.
                Some(parent) if parent.install => {
                    let rename = inactive_pk
                        .or(active_pk)
                        .map(Rename::ByPk)
                        .unwrap_or_default();
                    Some(UpdateDirective {
                        rename,
                        install: true,
                        ..Default::default()
                    })
                }
                // Computer retires without a replacement; its codes are
                // archived alongside it.
                Some(_) => {
                    if let Some(pk) = active_pk {
                        Some(UpdateDirective {
                            hide: true,
                            rename: Rename::ByPk(pk),
                            ..Default::default()
                        })
                    } else {
                        inactive_pk.map(|pk| UpdateDirective {
                            rename: Rename::ByPk(pk),
                            ..Default::default()
                        })
                    }
                }
                // Computer is live and current: stale and disabled entries
                // are archived for every grant, reinstallation is gated.
                None => {
                    let live = computers.active.contains(&Label::from(instance.as_str()));
                    let gate = install_gate(&instance, selected_grant);
                    if !live {
                        None
                    } else if let Some(pk) = active_pk {
                        if code_is_current(def, &full, exports, opts)? {
                            Some(UpdateDirective {
                                check_uenv: true,
                                ..Default::default()
                            })
                        } else {
                            Some(UpdateDirective {
                                rename: Rename::ByPk(pk),
                                install: gate,
                                ..Default::default()
                            })
                        }
                    } else if let Some(pk) = inactive_pk {
                        Some(UpdateDirective {
                            rename: Rename::ByPk(pk),
                            install: gate,
                            ..Default::default()
                        })
                    } else if gate {
                        Some(UpdateDirective {
                            install: true,
                            ..Default::default()
                        })
                    } else {
                        None
                    }
                }
            };
            if let Some(directive) = directive {
                report.plan.codes.insert(full, directive);
            }
        }
    }
    Ok(())
}

/// Fresh installs only fire for the selected grant. Grant-less instances
/// (localhost) never pass the gate.
fn install_gate(instance: &InstanceId, selected_grant: Option<&str>) -> bool {
    matches!((instance.grant(), selected_grant), (Some(g), Some(s)) if g == s)
}

fn declared_instances(profile: &Profile) -> BTreeSet<String> {
    profile
        .computers
        .keys()
        .flat_map(|name| profile.instances_of(name))
        .map(|id| id.0)
        .collect()
}

/// A failed export is treated as stale: the entry exists but cannot be
/// verified, so it gets rebuilt rather than trusted.
fn computer_is_current(
    def: &ComputerDef,
    instance: &InstanceId,
    exports: &dyn ExportSource,
    opts: &CompareOptions,
) -> Result<bool, ReconcileError> {
    let declared_setup = attribute_entries(&def.setup)?;
    let declared_config = attribute_entries(&def.config)?;
    match exports.computer(&Label::from(instance.as_str())) {
        Ok(export) => {
            let cmp = compare_computer(&declared_setup, &declared_config, &export, opts);
            if !cmp.equal {
                let summary = cmp.rationale.lines().next().unwrap_or_default().to_owned();
                tracing::info!(%instance, mismatch = %summary, "computer out of date");
            }
            Ok(cmp.equal)
        }
        Err(err) => {
            tracing::warn!(%instance, error = %err, "export failed, treating entry as stale");
            Ok(false)
        }
    }
}

fn code_is_current(
    def: &CodeDef,
    label: &Label,
    exports: &dyn ExportSource,
    opts: &CompareOptions,
) -> Result<bool, ReconcileError> {
    let declared = attribute_entries(def)?;
    match exports.code(label) {
        Ok(exported) => {
            let cmp = compare_code(&declared, &exported, opts);
            if !cmp.equal {
                let summary = cmp.rationale.lines().next().unwrap_or_default().to_owned();
                tracing::info!(code = %label, mismatch = %summary, "code out of date");
            }
            Ok(cmp.equal)
        }
        Err(err) => {
            tracing::warn!(code = %label, error = %err, "export failed, treating entry as stale");
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
