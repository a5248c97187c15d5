//! Configuration types for Winsync.
//!
//! The configuration file supports JSONC format (JSON with comments).
//! Every field has a default, so an empty file (or no file) is valid.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reconciler timing and capacity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconcilerConfig {
    /// Time a command waits for its confirming notification, in milliseconds.
    pub command_timeout_ms: u64,

    /// How long after a timeout a late confirmation is still attributed to
    /// the command, in milliseconds.
    pub late_confirmation_grace_ms: u64,

    /// Distinct queued notifications before the normalizer compacts and warns.
    pub notification_queue_capacity: usize,

    /// Bound of the actor's control channel.
    pub control_channel_capacity: usize,

    /// Undelivered events per subscriber before a lag warning is logged.
    pub subscriber_queue_capacity: usize,

    /// Frames closer than this (in points, per component) compare equal.
    pub frame_tolerance: f64,

    /// Retired entity ids kept resolvable before their slots are recycled.
    pub retired_retention: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 500,
            late_confirmation_grace_ms: 250,
            notification_queue_capacity: 256,
            control_channel_capacity: 256,
            subscriber_queue_capacity: 64,
            frame_tolerance: 0.5,
            retired_retention: 1024,
        }
    }
}

impl ReconcilerConfig {
    #[must_use]
    pub const fn command_timeout(&self) -> Duration { Duration::from_millis(self.command_timeout_ms) }

    #[must_use]
    pub const fn late_confirmation_grace(&self) -> Duration {
        Duration::from_millis(self.late_confirmation_grace_ms)
    }

    /// Rejects settings the reconciler cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = [
            ("commandTimeoutMs", self.command_timeout_ms == 0),
            ("notificationQueueCapacity", self.notification_queue_capacity == 0),
            ("controlChannelCapacity", self.control_channel_capacity == 0),
            ("subscriberQueueCapacity", self.subscriber_queue_capacity == 0),
        ];
        if let Some((field, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
        }
        if !self.frame_tolerance.is_finite() || self.frame_tolerance < 0.0 {
            return Err(ConfigError::Invalid(
                "frameTolerance must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging settings used by the binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self { Self { level: "info".to_string(), json: false } }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct WinsyncConfig {
    /// JSON schema reference for editor support.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub reconciler: ReconcilerConfig,

    pub logging: LoggingConfig,
}

/// Errors that can occur when loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No configuration file was found in any of the expected locations.
    #[error(
        "No configuration file found. Expected at $XDG_CONFIG_HOME/winsync/config.jsonc \
         or ~/.config/winsync/config.jsonc"
    )]
    NotFound,

    /// The configuration file exists but could not be read.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// The configuration file contains invalid JSON.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The configuration parsed but holds unusable values.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration file names to search for (in priority order).
const CONFIG_FILE_NAMES: &[&str] = &["config.jsonc", "config.json"];

/// Returns the possible configuration file paths in priority order.
///
/// 1. `$XDG_CONFIG_HOME/winsync/` if set
/// 2. `~/.config/winsync/`
/// 3. the platform configuration directory (`dirs::config_dir()`)
#[must_use]
pub fn config_paths() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        dirs.push(PathBuf::from(xdg_config).join("winsync"));
    }
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".config").join("winsync"));
    }
    if let Some(config_dir) = dirs::config_dir() {
        dirs.push(config_dir.join("winsync"));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for dir in dirs {
        for filename in CONFIG_FILE_NAMES {
            let path = dir.join(filename);
            // XDG_CONFIG_HOME is often ~/.config itself.
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}

/// Loads the configuration from the first available config file.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if no configuration file exists, or any
/// error from [`load_config_from_path`].
pub fn load_config() -> Result<(WinsyncConfig, PathBuf), ConfigError> {
    for path in config_paths() {
        if path.exists() {
            return load_config_from_path(&path);
        }
    }

    Err(ConfigError::NotFound)
}

/// Loads and validates the configuration at `path`.
///
/// Comments (`//` and `/* */`) are stripped before parsing.
///
/// # Errors
///
/// Returns `ConfigError::NotFound` if the file does not exist,
/// `ConfigError::IoError` or `ConfigError::ParseError` if it cannot be read
/// or parsed, and `ConfigError::Invalid` if validation fails.
pub fn load_config_from_path(path: &Path) -> Result<(WinsyncConfig, PathBuf), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound);
    }

    let file = fs::File::open(path)?;
    let reader = json_comments::StripComments::new(file);
    let config: WinsyncConfig = serde_json::from_reader(reader)?;
    config.reconciler.validate()?;
    Ok((config, path.to_path_buf()))
}
