//! CLI argument parsing via clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use playground::build_info::HELP_BUILD_METADATA;

/// Run a prompt against up to three models side by side.
#[derive(Debug, Parser)]
#[command(
    name = "playground",
    disable_version_flag = true,
    after_help = HELP_BUILD_METADATA
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to config file (default: ./playground.toml or ~/.config/playground/playground.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Log at debug level unless RUST_LOG is set.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Print version and build metadata.
    #[arg(short = 'V', long = "version")]
    pub version: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the playground slots and wait for every run to settle.
    Run(RunArgs),
    /// Show which existing major version the parameters match.
    Match(MatchArgs),
}

#[derive(Debug, ClapArgs)]
pub struct RunArgs {
    /// Task identifier.
    #[arg(long = "task")]
    pub task: String,

    /// Playground parameter file (TOML, or JSON with a .json extension).
    #[arg(short = 'p', long = "params")]
    pub params: PathBuf,

    /// Slot to run; repeatable. Defaults to every visible slot.
    #[arg(long = "slot", value_parser = clap::value_parser!(u8).range(0..3))]
    pub slots: Vec<u8>,
}

#[derive(Debug, ClapArgs)]
pub struct MatchArgs {
    /// Task identifier.
    #[arg(long = "task")]
    pub task: String,

    /// Playground parameter file (TOML, or JSON with a .json extension).
    #[arg(short = 'p', long = "params")]
    pub params: PathBuf,
}
