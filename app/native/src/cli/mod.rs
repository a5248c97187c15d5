//! CLI module for Winsync.
//!
//! The binary replays notification scripts through a live session and
//! manages the configuration file.

mod commands;
mod output;

use clap::Parser;
pub use commands::Cli;
pub use commands::replay::{
    CommandOutcome, Outcome, ReplayOutput, ReplayReport, ReplayStep, ScriptLine, parse_script,
    replay,
};

use crate::error::WinsyncError;

/// Runs the CLI.
///
/// Parses command-line arguments and executes the appropriate command.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn run() -> Result<(), WinsyncError> {
    let cli = Cli::parse();
    cli.execute()
}
