//! `maestro audit` — stale work-chain report from the provenance snapshot.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use maestro_audit::{load_snapshot, scan, Finding, StaleWorkChainReport, DEFAULT_CUTOFF_DAYS};
use maestro_daemon::paths::snapshot_path;
use maestro_exec::ShellRunner;
use maestro_verdi::verbs::process_play;

use super::home_dir;

/// Arguments for `maestro audit`.
#[derive(Args, Debug)]
pub struct AuditCmdArgs {
    /// Age cutoff in days.
    #[arg(long, default_value_t = DEFAULT_CUTOFF_DAYS)]
    pub days: u32,

    /// Select records created more recently than the cutoff instead.
    #[arg(long)]
    pub reverse: bool,

    /// Select paused records from the recent window.
    #[arg(long)]
    pub paused: bool,

    /// Resume the selected paused records via `verdi process play`.
    #[arg(long, requires = "paused")]
    pub play: bool,

    /// Provenance snapshot to scan; defaults to `~/.maestro/provenance.json`.
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl AuditCmdArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let path = self.snapshot.unwrap_or_else(|| snapshot_path(&home));
        let store = load_snapshot(&path)
            .with_context(|| format!("failed to load provenance snapshot {}", path.display()))?;

        let report = scan(&store, self.days, self.reverse, self.paused);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .context("failed to serialize audit JSON")?
            );
        } else {
            print_report(&report);
        }

        if self.play {
            let pks = report.pks();
            if pks.is_empty() {
                println!("nothing to resume");
                return Ok(());
            }
            let runner = ShellRunner::new();
            let output = process_play(&runner, &pks)
                .with_context(|| format!("failed to resume {} paused record(s)", pks.len()))?;
            if !output.trim().is_empty() {
                println!("{}", output.trim_end());
            }
            println!("{} resumed {} paused record(s)", "✓".green().bold(), pks.len());
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct FindingRow {
    #[tabled(rename = "pk")]
    pk: String,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "paused")]
    paused: String,
    #[tabled(rename = "deletable")]
    deletable: String,
}

fn print_report(report: &StaleWorkChainReport) {
    let window = if report.reverse || report.paused_only {
        format!("newer than {} days", report.cutoff_days)
    } else {
        format!("older than {} days", report.cutoff_days)
    };
    println!(
        "{} non-terminal record(s) {window}{}",
        report.findings.len(),
        if report.paused_only { ", paused only" } else { "" },
    );

    if report.is_clean() {
        println!("{} nothing to audit", "✓".green().bold());
        return;
    }

    let rows: Vec<FindingRow> = report.findings.iter().map(finding_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    let blocked = report.blocked();
    if !blocked.is_empty() {
        let pks: Vec<String> = blocked.iter().map(ToString::to_string).collect();
        println!(
            "{} still feeding other workflows: {}",
            "!".yellow().bold(),
            pks.join(", ")
        );
    }
}

fn finding_row(finding: &Finding) -> FindingRow {
    FindingRow {
        pk: finding.pk.to_string(),
        created: finding.ctime.format("%Y-%m-%d %H:%M").to_string(),
        state: format!("{:?}", finding.state).to_lowercase(),
        paused: if finding.paused { "yes".to_string() } else { String::new() },
        deletable: match finding.safe_to_delete {
            Some(true) => "yes".green().to_string(),
            Some(false) => "no".red().to_string(),
            None => "-".to_string(),
        },
    }
}
