//! `maestro select` — read and write widget selections in the settings
//! store. `set` initializes the store on first use.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use maestro_core::{settings, UNSELECTED};

use super::home_dir;

#[derive(Subcommand, Debug)]
pub enum SelectCommand {
    /// List the current selections.
    Show,

    /// Set one selection key (e.g. `maestro select set grant lp16`).
    Set(SetArgs),

    /// Remove one selection key.
    Clear(ClearArgs),
}

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Selection key, matching a widget key of the profile.
    pub key: String,

    /// Value to select.
    pub value: String,
}

#[derive(Args, Debug)]
pub struct ClearArgs {
    /// Selection key to remove.
    pub key: String,
}

pub fn run(command: SelectCommand) -> Result<()> {
    let home = home_dir()?;

    match command {
        SelectCommand::Show => {
            let settings = match settings::load_at(&home) {
                Ok(settings) => settings,
                Err(maestro_core::SettingsError::SettingsNotFound { .. }) => {
                    println!("No selections yet. Run: maestro select set <key> <value>");
                    return Ok(());
                }
                Err(err) => return Err(err).context("failed to load settings"),
            };

            println!("profile: {}", settings.profile.display());
            if settings.selections.is_empty() {
                println!("No selections yet. Run: maestro select set <key> <value>");
                return Ok(());
            }
            for (key, value) in &settings.selections {
                if value == UNSELECTED {
                    println!("  {key} = {}", "unselected".yellow());
                } else {
                    println!("  {key} = {value}");
                }
            }
        }
        SelectCommand::Set(args) => {
            settings::init_at(&home, None, None).context("failed to initialize settings")?;
            settings::set_selection_at(&home, &args.key, &args.value)
                .with_context(|| format!("failed to set selection '{}'", args.key))?;
            println!("✓ {} = {}", args.key, args.value);
        }
        SelectCommand::Clear(args) => {
            settings::clear_selection_at(&home, &args.key)
                .with_context(|| format!("failed to clear selection '{}'", args.key))?;
            println!("✓ cleared {}", args.key);
        }
    }

    Ok(())
}
