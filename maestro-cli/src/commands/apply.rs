//! `maestro apply` — run a full reconcile pass and report per stage.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use maestro_exec::ShellRunner;
use maestro_reconcile::{ApplyReport, RunContext};

use super::{home_dir, load_settings};

/// Arguments for `maestro apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ApplyArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let settings = load_settings(&home)?;
        let runner = ShellRunner::new();
        let ctx = RunContext::new(&runner, &home, settings);

        let applied = ctx.apply().context("apply failed")?;

        if self.json {
            print_json(&applied)?;
        } else {
            print_apply(&applied);
        }

        if !applied.summary.ok() {
            bail!(
                "{} update(s) failed — re-run `maestro apply` after fixing the cause",
                applied.summary.failed.len()
            );
        }
        Ok(())
    }
}

fn print_json(applied: &ApplyReport) -> Result<()> {
    let payload = serde_json::json!({
        "in_sync": applied.check.in_sync(),
        "plan": applied.check.report.plan,
        "summary": applied.summary,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize apply JSON")?
    );
    Ok(())
}

fn print_apply(applied: &ApplyReport) {
    super::check::print_check(&applied.check, false);

    for entry in &applied.summary.applied {
        println!("{} {entry}", "✓".green().bold());
    }
    for failure in &applied.summary.failed {
        println!("{} {failure}", "✗".red().bold());
    }
    for (host, image) in &applied.summary.uenvs {
        println!("{} uenv {image} on {host}", "✓".green().bold());
    }
    for report in &applied.summary.commands {
        match &report.failure {
            None => println!(
                "{} commands '{}' ({} run)",
                "✓".green().bold(),
                report.group,
                report.commands_run
            ),
            Some(failure) => println!(
                "{} commands '{}' stopped after {}: {failure}",
                "✗".red().bold(),
                report.group,
                report.commands_run
            ),
        }
    }
}
