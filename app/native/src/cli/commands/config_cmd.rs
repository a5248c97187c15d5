//! Config CLI commands.
//!
//! Commands for managing the Winsync configuration file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use colored::Colorize;

use crate::cli::output;
use crate::config::template::{create_config_file, generate_config_template};
use crate::config::{self, WinsyncConfig, config_paths};
use crate::error::WinsyncError;

/// Config management commands.
#[derive(Subcommand, Debug)]
#[command(next_display_order = None)]
pub enum ConfigCommands {
    /// Initialize a new configuration file with all options documented.
    ///
    /// Creates a new configuration file at the default location with all
    /// available options commented out.
    #[command(
        name = "init",
        after_long_help = r#"Examples:
  winsync config init              # Create config at default location
  winsync config init --force      # Overwrite existing config
  winsync config init --path ~/winsync.jsonc  # Create at custom path
  winsync config init --stdout     # Print template to stdout"#
    )]
    Init {
        /// Overwrite existing configuration file if it exists.
        #[arg(long, short)]
        force: bool,

        /// Custom path for the configuration file.
        /// If not specified, uses the first search path.
        #[arg(long, short, value_name = "PATH")]
        path: Option<PathBuf>,

        /// Print the configuration template to stdout instead of writing to a file.
        #[arg(long)]
        stdout: bool,
    },

    /// Show the configuration file search paths.
    ///
    /// Indicates which file is currently in use (if any).
    Path,

    /// Print the effective configuration.
    ///
    /// Loads the active file (or `--config`), validates it and prints the
    /// result with every default filled in.
    Show {
        /// Print plain JSON without highlighting.
        #[arg(long)]
        raw: bool,
    },
}

/// Execute config subcommands.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cmd: &ConfigCommands, custom: Option<&Path>) -> Result<(), WinsyncError> {
    match cmd {
        ConfigCommands::Init { force, path, stdout } => {
            if *stdout {
                println!("{}", generate_config_template());
                Ok(())
            } else {
                init_config(*force, path.clone())
            }
        }
        ConfigCommands::Path => {
            show_config_paths();
            Ok(())
        }
        ConfigCommands::Show { raw } => show_config(custom, *raw),
    }
}

fn default_path() -> PathBuf {
    config_paths().into_iter().next().unwrap_or_else(|| PathBuf::from("config.jsonc"))
}

/// Initialize a new configuration file.
fn init_config(force: bool, custom_path: Option<PathBuf>) -> Result<(), WinsyncError> {
    let config_path = custom_path.unwrap_or_else(default_path);

    if config_path.exists() && !force {
        return Err(WinsyncError::ConfigError(format!(
            "Configuration file already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        )));
    }

    create_config_file(&config_path).map_err(|e| {
        WinsyncError::ConfigError(format!(
            "Failed to create config file {}: {e}",
            config_path.display()
        ))
    })?;

    println!("Configuration file created at: {}", config_path.display());
    println!("\nAll options are commented out by default.");
    println!("Edit the file and uncomment the options you want to configure.");
    Ok(())
}

/// Labels each search path as active, shadowed, or absent.
fn path_markers(paths: &[PathBuf]) -> Vec<(&Path, &'static str)> {
    let mut found = false;
    paths
        .iter()
        .map(|path| {
            let marker = match (path.exists(), found) {
                (true, false) => {
                    found = true;
                    " (active)"
                }
                (true, true) => " (exists)",
                (false, _) => "",
            };
            (path.as_path(), marker)
        })
        .collect()
}

fn show_config_paths() {
    println!("Configuration file search paths (in priority order):\n");

    let paths = config_paths();
    let markers = path_markers(&paths);
    for (i, (path, marker)) in markers.iter().enumerate() {
        println!("  {}. {}{}", i + 1, path.display(), marker.green());
    }

    if !markers.iter().any(|(_, marker)| !marker.is_empty()) {
        println!("\nNo configuration file found.");
        println!("Run 'winsync config init' to create one.");
    }
}

fn show_config(custom: Option<&Path>, raw: bool) -> Result<(), WinsyncError> {
    let (config, source) = config::load(custom)?;
    let value = effective_json(&config)?;

    match source {
        Some(path) => eprintln!("{} {}", "Loaded from".dimmed(), path.display()),
        None => eprintln!("{}", "No configuration file found; showing defaults".dimmed()),
    }

    if raw {
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    } else {
        output::print_highlighted_json(&value);
    }
    Ok(())
}

fn effective_json(config: &WinsyncConfig) -> Result<serde_json::Value, WinsyncError> {
    serde_json::to_value(config).map_err(|err| WinsyncError::ConfigError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_markers_flag_first_existing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.jsonc");
        let first = dir.path().join("a.jsonc");
        let second = dir.path().join("b.jsonc");
        std::fs::write(&first, "{}").unwrap();
        std::fs::write(&second, "{}").unwrap();

        let paths = vec![missing, first, second];
        let markers: Vec<&str> = path_markers(&paths).into_iter().map(|(_, m)| m).collect();
        assert_eq!(markers, vec!["", " (active)", " (exists)"]);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.jsonc");
        std::fs::write(&path, "{}").unwrap();

        let err = init_config(false, Some(path.clone())).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(init_config(true, Some(path)).is_ok());
    }

    #[test]
    fn test_effective_json_fills_defaults() {
        let value = effective_json(&WinsyncConfig::default()).unwrap();
        assert_eq!(value["reconciler"]["commandTimeoutMs"], 500);
        assert_eq!(value["logging"]["level"], "info");
    }
}
