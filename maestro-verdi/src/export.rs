//! Attribute exports from the live registry.
//!
//! The comparator never talks to `verdi` itself; it gets both sides as
//! flat attribute maps. This module produces the exported side by dumping
//! a live entry's attributes to YAML files in a scratch directory and
//! parsing them back.
//!
//! Every function has an `_at(dir, …)` form writing into an explicit
//! directory (tests seed the files there and script the export command as
//! a no-op) and a wrapper allocating a temp directory.

use std::collections::BTreeMap;
use std::path::Path;

use maestro_core::types::{attribute_entries, Label};
use maestro_exec::{CommandRunner, CommandSpec};
use serde_yaml::Value;

use crate::error::VerdiError;

/// Setup and config blocks of a live computer, as exported attribute maps.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputerExport {
    pub setup: BTreeMap<String, Value>,
    pub config: BTreeMap<String, Value>,
}

/// Export both attribute blocks of the computer labelled `label` into `dir`.
pub fn export_computer_at(
    runner: &dyn CommandRunner,
    dir: &Path,
    label: &Label,
) -> Result<ComputerExport, VerdiError> {
    let setup_path = dir.join("setup.yml");
    let config_path = dir.join("config.yml");

    run_export(
        runner,
        &["verdi", "computer", "export", "setup", label.as_str(), &path_arg(&setup_path)],
    )?;
    run_export(
        runner,
        &["verdi", "computer", "export", "config", label.as_str(), &path_arg(&config_path)],
    )?;

    Ok(ComputerExport {
        setup: read_attribute_file(&setup_path)?,
        config: read_attribute_file(&config_path)?,
    })
}

/// `export_computer_at` in a fresh temp directory.
pub fn export_computer(
    runner: &dyn CommandRunner,
    label: &Label,
) -> Result<ComputerExport, VerdiError> {
    let dir = tempfile::tempdir()?;
    export_computer_at(runner, dir.path(), label)
}

/// Export the attribute block of the code labelled `label` into `dir`.
pub fn export_code_at(
    runner: &dyn CommandRunner,
    dir: &Path,
    label: &Label,
) -> Result<BTreeMap<String, Value>, VerdiError> {
    let export_path = dir.join("export.yml");
    run_export(
        runner,
        &["verdi", "code", "export", label.as_str(), &path_arg(&export_path)],
    )?;
    read_attribute_file(&export_path)
}

/// `export_code_at` in a fresh temp directory.
pub fn export_code(
    runner: &dyn CommandRunner,
    label: &Label,
) -> Result<BTreeMap<String, Value>, VerdiError> {
    let dir = tempfile::tempdir()?;
    export_code_at(runner, dir.path(), label)
}

fn run_export(runner: &dyn CommandRunner, argv: &[&str]) -> Result<(), VerdiError> {
    let spec = CommandSpec::local(argv.iter().copied());
    let outcome = runner.run(&spec);
    if outcome.success {
        Ok(())
    } else {
        Err(VerdiError::Command { command: spec.rendered(), output: outcome.output })
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn read_attribute_file(path: &Path) -> Result<BTreeMap<String, Value>, VerdiError> {
    let contents = std::fs::read_to_string(path)?;
    let value: Value = serde_yaml::from_str(&contents)
        .map_err(|e| VerdiError::Parse { path: path.to_path_buf(), source: e })?;
    attribute_entries(&value)
        .map_err(|e| VerdiError::Parse { path: path.to_path_buf(), source: e })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
