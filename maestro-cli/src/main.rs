//! Maestro — declarative AiiDA resource management CLI.
//!
//! # Usage
//!
//! ```text
//! maestro status [--json]
//! maestro check [--json]
//! maestro apply [--json]
//! maestro select show
//! maestro select set <key> <value>
//! maestro select clear <key>
//! maestro audit [--days N] [--reverse] [--paused] [--play] [--json]
//! maestro run-commands
//! maestro daemon start|stop|status|install|uninstall|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    apply::ApplyArgs, audit::AuditCmdArgs, check::CheckArgs, daemon::DaemonCommand,
    run_commands::RunCommandsArgs, select::SelectCommand, status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "maestro",
    version,
    about = "Reconcile declared HPC computers and codes against a live AiiDA profile",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the live registry, the settings store, and the daemon state.
    Status(StatusArgs),

    /// Build the update plan without touching anything.
    Check(CheckArgs),

    /// Build the update plan and apply it against the registry.
    Apply(ApplyArgs),

    /// Show or change widget selections in the settings store.
    Select {
        #[command(subcommand)]
        command: SelectCommand,
    },

    /// Scan the provenance snapshot for stale work chains.
    Audit(AuditCmdArgs),

    /// Run the profile's post-apply command groups.
    RunCommands(RunCommandsArgs),

    /// Manage the maestro background daemon and systemd integration.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Status(args) => args.run(),
        Commands::Check(args) => args.run(),
        Commands::Apply(args) => args.run(),
        Commands::Select { command } => commands::select::run(command),
        Commands::Audit(args) => args.run(),
        Commands::RunCommands(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

/// Library crates log through `tracing`; route that to stderr so table and
/// JSON output on stdout stay parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("MAESTRO_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
