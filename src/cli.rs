//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};

/// Autonomous voxel-game agent with goal planning and mode-based behavior
///
/// Runs against the built-in world simulation, driven by a scripted offline
/// LLM unless an OpenAI-compatible endpoint is configured.
#[derive(Parser, Debug)]
#[command(name = "voxbot")]
#[command(author, about, long_about = None)]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the agent until the goal settles or the tick budget runs out
    Run {
        /// Goal to pursue
        #[arg(short, long, default_value = "collect four oak logs")]
        goal: String,

        /// Tick budget
        #[arg(short, long, default_value_t = 64)]
        ticks: u64,

        /// Use the scripted offline LLM even if an API key is configured
        #[arg(long)]
        scripted: bool,
    },

    /// Print the persisted planning state
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        cmd: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Write a starter config file if none exists
    Init,
}
