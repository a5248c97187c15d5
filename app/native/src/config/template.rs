//! Configuration template generation.
//!
//! Generates a commented configuration template with all available options.

use std::fs;
use std::path::Path;

/// Generates a configuration template with all options commented out.
#[must_use]
pub fn generate_config_template() -> String {
    r##"// Winsync Configuration File
// ==========================
// This file uses JSONC format (JSON with comments).
// All options below are commented out and show their default values.
// Uncomment and modify the options you want to configure.
//
// Generate a JSON schema for editor support with: winsync schema

{
  // ============================================================================
  // Reconciler
  // ============================================================================
  // "reconciler": {
  //   // How long a command waits for the window server to confirm it (ms)
  //   "commandTimeoutMs": 500,
  //
  //   // After a timeout, a late confirmation within this window is still
  //   // reported as caused by the command (ms)
  //   "lateConfirmationGraceMs": 250,
  //
  //   // Distinct queued notifications before the queue compacts and warns
  //   "notificationQueueCapacity": 256,
  //
  //   // Bound of the reconciler's control channel
  //   "controlChannelCapacity": 256,
  //
  //   // Undelivered events per subscriber before a lag warning is logged
  //   "subscriberQueueCapacity": 64,
  //
  //   // Frames closer than this (points, per component) are treated as equal
  //   "frameTolerance": 0.5,
  //
  //   // Destroyed entity ids kept resolvable before their slots are reused
  //   "retiredRetention": 1024
  // },

  // ============================================================================
  // Logging
  // ============================================================================
  // "logging": {
  //   // Default filter directive; RUST_LOG takes precedence
  //   "level": "info",
  //
  //   // Emit JSON lines instead of human-readable output
  //   "json": false
  // }
}
"##
    .to_string()
}

/// Creates a configuration file with the template at the specified path.
///
/// Creates parent directories if they don't exist.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn create_config_file(path: &Path) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, generate_config_template())
}
