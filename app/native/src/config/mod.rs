//! Configuration module for Winsync.
//!
//! This module provides configuration types and loading functionality.
//! Configuration is loaded once by the caller and passed in explicitly;
//! there is no global instance.
//!
//! The configuration file supports JSONC format (JSON with comments).
//! Both single-line (`//`) and multi-line (`/* */`) comments are allowed.

pub mod template;
pub mod types;

use std::path::{Path, PathBuf};

pub use types::{
    ConfigError, LoggingConfig, ReconcilerConfig, WinsyncConfig, config_paths,
    load_config as load_config_default, load_config_from_path,
};

/// Loads the configuration from `custom` or the default search paths.
///
/// A missing file yields the defaults. Any other failure is returned so the
/// caller can report it.
///
/// # Errors
///
/// Returns the [`ConfigError`] for unreadable, unparsable, or invalid files.
pub fn load(custom: Option<&Path>) -> Result<(WinsyncConfig, Option<PathBuf>), ConfigError> {
    let result = custom.map_or_else(load_config_default, load_config_from_path);

    match result {
        Ok((config, path)) => {
            tracing::debug!(path = %path.display(), "loaded configuration");
            Ok((config, Some(path)))
        }
        Err(ConfigError::NotFound) if custom.is_none() => {
            tracing::debug!("no configuration file found, using defaults");
            Ok((WinsyncConfig::default(), None))
        }
        Err(err) => Err(err),
    }
}
