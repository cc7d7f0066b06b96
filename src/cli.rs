//! Argument types for the `fieldlog` binary.

use crate::sync::Direction;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fieldlog", about = "Offline-first field dataset sync")]
pub struct Cli {
    /// Path to a JSON config file. Defaults apply when omitted.
    #[arg(long, env = "FIELDLOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Per-project backed-up indicator.
    Status,
    /// Detailed divergence report for one project.
    Report {
        /// Project id; the active project when omitted.
        #[arg(long)]
        project: Option<String>,
    },
    /// Transfer every divergent file in one direction.
    Sync {
        #[arg(long, value_enum)]
        direction: DirectionArg,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DirectionArg {
    Push,
    Pull,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Push => Direction::Push,
            DirectionArg::Pull => Direction::Pull,
        }
    }
}
