//! `maestro status` — live registry, settings, and daemon visibility.
//!
//! Status never fails on an unreachable `verdi` or a stopped daemon; those
//! degrade into the report so the command stays usable on a fresh machine.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use maestro_core::{CodeListing, ComputerListing, Profile, Settings};
use maestro_daemon::{paths::socket_path, request_status, DaemonError};
use maestro_exec::ShellRunner;
use maestro_verdi::{list_codes, list_computers};

use super::home_dir;

/// Arguments for `maestro status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let report = build_report(&home);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_report(&report);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct StatusReport {
    daemon: DaemonStatus,
    settings: Option<SettingsStatus>,
    registry: RegistryStatus,
}

#[derive(Debug, Serialize)]
struct DaemonStatus {
    running: bool,
    socket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct SettingsStatus {
    profile: String,
    source: Option<String>,
    selections: Vec<(String, String)>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum RegistryStatus {
    Unreachable { error: String },
    Listed { computers: Vec<EntryRow>, codes: Vec<EntryRow> },
}

#[derive(Debug, Serialize)]
struct EntryRow {
    label: String,
    active: bool,
    orphan: Option<bool>,
}

fn build_report(home: &Path) -> StatusReport {
    let daemon = match request_status(home) {
        Ok(detail) => DaemonStatus {
            running: true,
            socket: socket_path(home).display().to_string(),
            detail: Some(detail),
        },
        Err(DaemonError::DaemonNotRunning { socket }) => DaemonStatus {
            running: false,
            socket: socket.display().to_string(),
            detail: None,
        },
        Err(err) => DaemonStatus {
            running: false,
            socket: socket_path(home).display().to_string(),
            detail: Some(serde_json::json!({ "error": err.to_string() })),
        },
    };

    let settings = maestro_core::settings::load_at(home).ok();
    let profile = settings.as_ref().and_then(|s| load_profile(home, s));

    let runner = ShellRunner::new();
    let registry = match (list_computers(&runner), list_codes(&runner)) {
        (Ok(computers), Ok(codes)) => RegistryStatus::Listed {
            computers: computer_rows(&computers, profile.as_ref()),
            codes: code_rows(&codes, profile.as_ref()),
        },
        (Err(err), _) | (_, Err(err)) => RegistryStatus::Unreachable { error: err.to_string() },
    };

    StatusReport {
        daemon,
        settings: settings.map(|s| SettingsStatus {
            profile: s.profile.display().to_string(),
            source: s.source.map(|spec| spec.repo),
            selections: s.selections.into_iter().collect(),
        }),
        registry,
    }
}

/// Profile used only for orphan marks; a profile that cannot be loaded yet
/// (missing selection, bad YAML) just leaves the marks off.
fn load_profile(home: &Path, settings: &Settings) -> Option<Profile> {
    let runner = ShellRunner::new();
    let ctx = maestro_reconcile::RunContext::new(&runner, home, settings.clone());
    ctx.load_profile().map(|(profile, _)| profile).ok()
}

fn computer_rows(listing: &ComputerListing, profile: Option<&Profile>) -> Vec<EntryRow> {
    let declared: Option<BTreeSet<String>> = profile.map(|p| {
        p.computers
            .keys()
            .flat_map(|key| p.instances_of(key))
            .map(|id| id.0)
            .collect()
    });
    let row = |label: &maestro_core::Label, active: bool| EntryRow {
        label: label.0.clone(),
        active,
        orphan: declared.as_ref().map(|set| !set.contains(&label.0)),
    };
    let mut rows: Vec<EntryRow> = listing.active.iter().map(|l| row(l, true)).collect();
    rows.extend(listing.inactive.iter().map(|l| row(l, false)));
    rows
}

fn code_rows(listing: &CodeListing, profile: Option<&Profile>) -> Vec<EntryRow> {
    let row = |entry: &maestro_core::CodeEntry, active: bool| EntryRow {
        label: entry.label.0.clone(),
        active,
        orphan: profile.map(|p| p.code_for(&entry.label.0).is_none()),
    };
    let mut rows: Vec<EntryRow> = listing.active.iter().map(|e| row(e, true)).collect();
    rows.extend(listing.inactive.iter().map(|e| row(e, false)));
    rows
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "label")]
    label: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "note")]
    note: String,
}

fn print_report(report: &StatusReport) {
    println!(
        "Maestro v{} | daemon {}",
        env!("CARGO_PKG_VERSION"),
        if report.daemon.running {
            "running".green().bold().to_string()
        } else {
            "stopped".bright_black().to_string()
        },
    );

    match &report.settings {
        Some(settings) => {
            println!("profile: {}", settings.profile);
            if let Some(repo) = &settings.source {
                println!("source:  {repo}");
            }
            for (key, value) in &settings.selections {
                println!("  {key} = {value}");
            }
        }
        None => println!("settings: not initialized — run `maestro select set grant <grant>`"),
    }

    match &report.registry {
        RegistryStatus::Unreachable { error } => {
            println!("{} registry unreachable: {error}", "✗".red().bold());
        }
        RegistryStatus::Listed { computers, codes } => {
            print_entries("COMPUTERS", computers);
            print_entries("CODES", codes);
        }
    }
}

fn print_entries(heading: &str, rows: &[EntryRow]) {
    println!("{}", heading.bold());
    if rows.is_empty() {
        println!("  none registered");
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .iter()
        .map(|row| StatusTableRow {
            label: row.label.clone(),
            state: if row.active {
                "active".green().to_string()
            } else {
                "inactive".bright_black().to_string()
            },
            note: match row.orphan {
                Some(true) => "orphan".magenta().bold().to_string(),
                Some(false) => "declared".to_string(),
                None => String::new(),
            },
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
}
