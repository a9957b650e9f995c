//! `maestro check` — dry-run reconcile: classify every declared instance
//! and show the plan without applying it.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use maestro_core::profile::SourceStatus;
use maestro_exec::ShellRunner;
use maestro_reconcile::{CheckReport, InstanceState, Rename, RunContext, UpdateDirective};

use super::{home_dir, load_settings};

/// Arguments for `maestro check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let settings = load_settings(&home)?;
        let runner = ShellRunner::new();
        let ctx = RunContext::new(&runner, &home, settings);

        let check = ctx.check().context("check failed")?;

        if self.json {
            print_json(&check)?;
            return Ok(());
        }

        print_check(&check, true);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct PlanTableRow {
    #[tabled(rename = "entry")]
    entry: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "actions")]
    actions: String,
}

fn print_json(check: &CheckReport) -> Result<()> {
    let payload = serde_json::json!({
        "in_sync": check.in_sync(),
        "source": check.source,
        "states": check.report.states,
        "plan": check.report.plan,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize check JSON")?
    );
    Ok(())
}

pub(crate) fn print_check(check: &CheckReport, suggest_apply: bool) {
    if check.source == SourceStatus::Refreshed {
        println!(
            "{} profile source was refreshed; review the incoming changes",
            "!".yellow().bold()
        );
    }

    if check.in_sync() {
        println!("{} registry matches the profile", "✓".green().bold());
        return;
    }

    let mut rows = Vec::new();
    for (instance, directive) in &check.report.plan.computers {
        rows.push(PlanTableRow {
            entry: format!("computer {instance}"),
            state: check
                .report
                .states
                .get(instance)
                .map_or_else(String::new, |s| state_label(*s).to_string()),
            actions: directive_actions(directive),
        });
    }
    for (label, directive) in &check.report.plan.codes {
        rows.push(PlanTableRow {
            entry: format!("code {label}"),
            state: String::new(),
            actions: directive_actions(directive),
        });
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if let Some(ssh) = &check.report.plan.ssh {
        let hosts: Vec<&str> = ssh.hosts.iter().map(String::as_str).collect();
        println!(
            "{} ssh config needs regeneration for: {}",
            "!".yellow().bold(),
            hosts.join(", ")
        );
    }

    if suggest_apply {
        println!("Run 'maestro apply' to reconcile.");
    }
}

fn state_label(state: InstanceState) -> &'static str {
    match state {
        InstanceState::Absent => "absent",
        InstanceState::Inactive => "inactive",
        InstanceState::ActiveStale => "stale",
        InstanceState::ActiveCurrent => "current",
        InstanceState::Orphaned => "orphaned",
    }
}

fn directive_actions(directive: &UpdateDirective) -> String {
    let mut actions = Vec::new();
    match directive.rename {
        Rename::No => {}
        Rename::Archive => actions.push("archive".to_string()),
        Rename::ByPk(pk) => actions.push(format!("archive pk {pk}")),
    }
    if directive.hide {
        actions.push("hide".to_string());
    }
    if directive.install {
        actions.push("install".to_string());
    }
    if directive.check_uenv {
        actions.push("check uenv".to_string());
    }
    if actions.is_empty() {
        "none".to_string()
    } else {
        actions.join(" + ")
    }
}
