//! CLI command definitions using Clap.
//!
//! - `config_cmd` - Configuration file management
//! - `replay` - Replays a notification script through a live session

use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Generator, Shell, generate};

use crate::error::WinsyncError;
use crate::logging::{self, Verbosity};
use crate::{config, schema};

pub mod config_cmd;
pub mod replay;

pub use config_cmd::ConfigCommands;
pub use replay::ReplayArgs;

/// Application version from Cargo.toml.
const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Winsync CLI - live window-management state reconciler.
#[derive(Parser, Debug)]
#[command(name = "winsync")]
#[command(author, version = APP_VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to a custom configuration file.
    ///
    /// Overrides the default configuration file search paths.
    /// Supports JSONC format (JSON with comments).
    #[arg(long, short, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors.
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum Commands {
    /// Replay a notification script through a live session.
    ///
    /// Seeds an in-memory window server, feeds it the scripted notifications
    /// and commands, and prints every event the session emits.
    Replay(ReplayArgs),

    /// Configuration file management commands.
    ///
    /// Initialize, locate, and inspect the configuration file.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Output the configuration JSON Schema.
    ///
    /// Can be redirected to a file for use with editors that support JSON
    /// Schema validation.
    Schema,

    /// Generate shell completions.
    ///
    /// Usage:
    ///   eval "$(winsync completions --shell zsh)"
    ///   winsync completions --shell fish > ~/.config/fish/completions/winsync.fish
    Completions {
        /// The shell to generate completions for.
        #[arg(long, short, value_enum)]
        shell: Shell,
    },
}

impl Cli {
    #[must_use]
    pub const fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the command
    /// fails.
    pub fn execute(&self) -> Result<(), WinsyncError> {
        match &self.command {
            Commands::Replay(args) => {
                let (config, _) = config::load(self.config.as_deref())?;
                logging::init(&config.logging, self.verbosity(), self.log_json);
                replay::execute(args, &config)
            }
            Commands::Config(cmd) => config_cmd::execute(cmd, self.config.as_deref()),
            Commands::Schema => {
                println!("{}", schema::print_schema());
                Ok(())
            }
            Commands::Completions { shell } => {
                Self::print_completions(*shell);
                Ok(())
            }
        }
    }

    /// Print shell completions to stdout.
    fn print_completions<G: Generator>(generator: G) {
        let mut cmd = Self::command();
        generate(generator, &mut cmd, "winsync", &mut io::stdout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_schema() {
        let cli = Cli::try_parse_from(["winsync", "schema"]).unwrap();
        assert!(matches!(cli.command, Commands::Schema));
    }

    #[test]
    fn test_cli_parses_replay_flags() {
        let cli =
            Cli::try_parse_from(["winsync", "replay", "s.jsonl", "--json", "--summary"]).unwrap();
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.script, PathBuf::from("s.jsonl"));
                assert!(args.json);
                assert!(args.summary);
                assert!(!args.strict);
            }
            _ => panic!("Expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parses_config_show() {
        let cli = Cli::try_parse_from(["winsync", "config", "show", "--raw"]).unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigCommands::Show { raw: true })));
    }

    #[test]
    fn test_cli_parses_completions() {
        let cli = Cli::try_parse_from(["winsync", "completions", "--shell", "zsh"]).unwrap();
        match cli.command {
            Commands::Completions { shell } => assert_eq!(shell, Shell::Zsh),
            _ => panic!("Expected Completions command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "winsync",
            "replay",
            "s.jsonl",
            "--config",
            "/tmp/winsync.jsonc",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/winsync.jsonc")));
        assert_eq!(cli.verbosity(), Verbosity::Verbose);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["winsync", "-v", "-q", "schema"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() { Cli::command().debug_assert(); }
}
