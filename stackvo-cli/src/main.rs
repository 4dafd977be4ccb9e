//! Stackvo: local development stack lifecycle CLI.
//!
//! # Usage
//!
//! ```text
//! stackvo status [--json]
//! stackvo list [service|tool|project]
//! stackvo enable|disable|start|stop|restart <kind> <name>
//! stackvo deps <service>
//! stackvo project create|build|delete|job|jobs|cancel ...
//! stackvo events [--topic <prefix>]...
//! stackvo daemon start|stop|status|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, events::EventsArgs, project::ProjectCommand, units::ListArgs,
    units::UnitArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "stackvo",
    version,
    about = "Turn .env service flags into running Docker containers",
    long_about = None,
)]
struct Cli {
    /// Emit machine-readable JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show daemon, unit and container totals.
    Status,

    /// List services, tools or projects with their live state.
    List(ListArgs),

    /// Persist ENABLE=true, regenerate artifacts and start the container.
    Enable(UnitArgs),

    /// Persist ENABLE=false, regenerate artifacts and tear the container down.
    Disable(UnitArgs),

    /// Start an existing container.
    Start(UnitArgs),

    /// Stop a running container.
    Stop(UnitArgs),

    /// Restart a container.
    Restart(UnitArgs),

    /// Show required and optional dependencies of a service.
    Deps {
        /// Service name (e.g. "kibana").
        name: String,
    },

    /// Create, build and delete projects.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Stream orchestrator events until interrupted.
    Events(EventsArgs),

    /// Manage the Stackvo background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let json = cli.json;
    match cli.command {
        Commands::Status => commands::status::run(json),
        Commands::List(args) => commands::units::list(args, json),
        Commands::Enable(args) => commands::units::lifecycle("enable", args, json),
        Commands::Disable(args) => commands::units::lifecycle("disable", args, json),
        Commands::Start(args) => commands::units::lifecycle("start", args, json),
        Commands::Stop(args) => commands::units::lifecycle("stop", args, json),
        Commands::Restart(args) => commands::units::lifecycle("restart", args, json),
        Commands::Deps { name } => commands::units::deps(&name, json),
        Commands::Project { command } => commands::project::run(command, json),
        Commands::Events(args) => commands::events::run(args, json),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
