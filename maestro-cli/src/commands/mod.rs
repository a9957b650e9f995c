pub mod apply;
pub mod audit;
pub mod check;
pub mod daemon;
pub mod run_commands;
pub mod select;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Home directory every command hangs its paths off.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Load the settings store, with a first-run hint on failure.
pub fn load_settings(home: &std::path::Path) -> Result<maestro_core::Settings> {
    maestro_core::settings::load_at(home)
        .context("failed to load settings — run `maestro select set grant <grant>` first")
}
