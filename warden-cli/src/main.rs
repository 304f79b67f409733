//! Warden — lock screen policy watchdog CLI.
//!
//! # Usage
//!
//! ```text
//! warden install
//! warden remove
//! warden start
//! warden stop
//! warden pause
//! warden continue
//! warden status [--json]
//! warden logs [--lines N] [--stderr-only]
//! warden run [--store-root <dir>] [--doc <file>] [--name <value>] [--grace-secs N]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{control::StatusArgs, logs::LogsArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    version,
    about = "Keep the managed lock screen image pinned to its policy value",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install and bootstrap the launchd agent.
    Install,

    /// Boot out and remove the launchd agent.
    Remove,

    /// Start the installed agent via launchd.
    Start,

    /// Ask the running agent to stop.
    Stop,

    /// Suspend enforcement without stopping the agent.
    Pause,

    /// Resume enforcement after a pause.
    Continue,

    /// Show agent state and watch counters.
    Status(StatusArgs),

    /// Print recent agent log lines.
    Logs(LogsArgs),

    /// Run the agent in the foreground (change monitor + control socket).
    Run(RunArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Install => commands::admin::install(),
        Commands::Remove => commands::admin::remove(),
        Commands::Start => commands::admin::start(),
        Commands::Stop => commands::control::stop(),
        Commands::Pause => commands::control::pause(),
        Commands::Continue => commands::control::resume(),
        Commands::Status(args) => args.run(),
        Commands::Logs(args) => args.run(),
        Commands::Run(args) => args.run(),
    }
}
