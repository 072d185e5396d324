//! CLI definitions for hwst.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "hwst",
    version,
    about = "Hardware self-test client",
    after_help = "Examples:\n  hwst run                               # run against the local agent\n  hwst run --address ws://10.0.0.7:8002\n  hwst run --show-previous               # display stored results when available\n  hwst plan --capabilities hdd_status,tuner_status"
)]
pub struct Cli {
    /// Show debug logs.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the agent and run every available diagnostic.
    Run {
        /// Configuration file (hwst.toml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Agent address override (ws://host:port).
        #[arg(long)]
        address: Option<String>,
        /// Show the agent's stored results instead of running, when they are complete.
        #[arg(long, action = ArgAction::SetTrue)]
        show_previous: bool,
    },
    /// Print the run plan and ordering without connecting.
    Plan {
        /// Configuration file (hwst.toml).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Pretend the agent reported these diagnostics.
        #[arg(long, value_delimiter = ',')]
        capabilities: Vec<String>,
    },
}
