//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "intelsync")]
#[command(author, version, about = "Threat-intelligence sync daemon with nftables blacklist")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "/etc/intelsync/config.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use an in-process store instead of PostgreSQL (nothing is persisted)
    #[arg(long, global = true)]
    pub memory: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the sync daemon until SIGINT/SIGTERM
    Run,

    /// Run a single sync cycle
    Sync {
        /// Do not activate the ruleset even if the blacklist changed
        #[arg(long)]
        no_activate: bool,
    },

    /// Print the ruleset compiled from the current blacklist
    Compile {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compile and activate the current blacklist now
    Activate,

    /// Show store contents and sync state
    Status,

    /// Create the database schema
    Migrate,

    /// Show version
    Version,
}
