//! Flightdeck — mission-control CLI for AI-agent project lifecycles.
//!
//! # Usage
//!
//! ```text
//! flightdeck init <name> [--plan-dir <dir>]
//! flightdeck projects
//! flightdeck phases <project> [--json]
//! flightdeck advance <project> <phase>
//! flightdeck rollback <project> <phase>
//! flightdeck status [--json]
//! flightdeck conflicts [--json]
//! flightdeck resolve <conflict-id> <use_dashboard|use_file>
//! flightdeck write <project> <phase> --set key=value ...
//! flightdeck log [--limit N] [--json]
//! flightdeck daemon start|stop|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    conflicts::{ConflictsArgs, ResolveArgs},
    daemon::DaemonCommand,
    init::InitArgs,
    lifecycle::{Direction, TransitionArgs},
    log::LogArgs,
    phases::PhasesArgs,
    status::StatusArgs,
    write::WriteArgs,
};

#[derive(Parser, Debug)]
#[command(
    name = "flightdeck",
    version,
    about = "Track and sync AI-agent project lifecycles",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a project and link its plan directory.
    Init(InitArgs),

    /// List registered projects.
    Projects,

    /// Show the lifecycle phases of a project.
    Phases(PhasesArgs),

    /// Move a phase one step forward in the pipeline.
    Advance(TransitionArgs),

    /// Move a phase one step back.
    Rollback(TransitionArgs),

    /// Show daemon and sync status.
    Status(StatusArgs),

    /// List unresolved sync conflicts.
    Conflicts(ConflictsArgs),

    /// Resolve one sync conflict by id.
    Resolve(ResolveArgs),

    /// Push field updates into a phase's plan file via the daemon.
    Write(WriteArgs),

    /// Show the sync audit log.
    Log(LogArgs),

    /// Manage the Flightdeck background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Projects => commands::projects::run(),
        Commands::Phases(args) => args.run(),
        Commands::Advance(args) => commands::lifecycle::run(args, Direction::Forward),
        Commands::Rollback(args) => commands::lifecycle::run(args, Direction::Back),
        Commands::Status(args) => args.run(),
        Commands::Conflicts(args) => args.run(),
        Commands::Resolve(args) => args.run(),
        Commands::Write(args) => args.run(),
        Commands::Log(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
