//! `maestro run-commands` — run the profile's post-apply command groups
//! on their own, without a reconcile pass.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use maestro_exec::ShellRunner;
use maestro_reconcile::{run_custom_commands, RunContext};

use super::{home_dir, load_settings};

/// Arguments for `maestro run-commands`.
#[derive(Args, Debug)]
pub struct RunCommandsArgs {}

impl RunCommandsArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let settings = load_settings(&home)?;
        let runner = ShellRunner::new();
        let ctx = RunContext::new(&runner, &home, settings);

        let (profile, _) = ctx.load_profile().context("failed to load profile")?;
        let reports = run_custom_commands(&runner, &profile);

        if reports.is_empty() {
            println!("no custom commands declared");
            return Ok(());
        }

        let mut failures = 0;
        for report in &reports {
            match &report.failure {
                None => println!(
                    "{} '{}' ({} run)",
                    "✓".green().bold(),
                    report.group,
                    report.commands_run
                ),
                Some(failure) => {
                    failures += 1;
                    println!(
                        "{} '{}' stopped after {}: {failure}",
                        "✗".red().bold(),
                        report.group,
                        report.commands_run
                    );
                }
            }
        }

        if failures > 0 {
            bail!("{failures} command group(s) failed");
        }
        Ok(())
    }
}
