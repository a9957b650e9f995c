//! Post-apply custom commands: named groups of one-liners that run after
//! the registry matches the profile.
//!
//! Groups run in name order (profiles prefix names like `10_modules` to get
//! a stable sequence) and are independent of each other. Within a group the
//! first failure skips the remaining commands of that group only.

use maestro_core::{CommandKind, CustomCommand, Profile, RemoteCommands};
use maestro_exec::{CommandRunner, CommandSpec};

use crate::error::ReconcileError;

/// Outcome of one command group.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommandReport {
    pub group: String,
    /// Commands that actually ran, the failed one included.
    pub commands_run: usize,
    /// Rendered error of the command that stopped the group.
    pub failure: Option<String>,
}

impl CommandReport {
    pub fn ok(&self) -> bool {
        self.failure.is_none()
    }
}

/// Run every declared command group and report per group.
pub fn run_custom_commands(runner: &dyn CommandRunner, profile: &Profile) -> Vec<CommandReport> {
    let Some(remote) = profile
        .custom_commands
        .as_ref()
        .and_then(|block| block.remote_commands.as_ref())
    else {
        return Vec::new();
    };
    remote
        .groups
        .iter()
        .map(|(name, commands)| run_group(runner, remote, name, commands))
        .collect()
}

fn run_group(
    runner: &dyn CommandRunner,
    remote: &RemoteCommands,
    name: &str,
    commands: &[CustomCommand],
) -> CommandReport {
    tracing::info!(group = name, commands = commands.len(), "running command group");
    let mut commands_run = 0;
    for entry in commands {
        let spec = match entry.kind {
            CommandKind::Ssh => CommandSpec::remote(&remote.remotehost, [entry.command.as_str()]),
            CommandKind::Shell => CommandSpec::local(["sh", "-c", entry.command.as_str()]),
        };
        let outcome = runner.run(&spec);
        commands_run += 1;
        if !outcome.success {
            let err = ReconcileError::CustomCommand {
                group: name.to_owned(),
                command: entry.command.clone(),
                output: outcome.output,
            };
            tracing::warn!(group = name, "{err}");
            return CommandReport {
                group: name.to_owned(),
                commands_run,
                failure: Some(err.to_string()),
            };
        }
    }
    CommandReport {
        group: name.to_owned(),
        commands_run,
        failure: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
