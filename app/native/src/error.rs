//! Error types for the Winsync binary.
//!
//! Library operations return their own error enums (`CommandError`,
//! `SessionError`, `ConfigError`); the CLI folds them into [`WinsyncError`]
//! at the edge.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::reconciler::{CommandError, SessionError};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum WinsyncError {
    /// Invalid command arguments.
    #[error("{0}")]
    InvalidArguments(String),
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// IO error.
    #[error("IO error: {0}")]
    IoError(String),
    /// A replay script line could not be parsed.
    #[error("Script error at line {line}: {message}")]
    ScriptError { line: usize, message: String },
    /// The session could not be created or stopped unexpectedly.
    #[error("Session error: {0}")]
    SessionError(String),
    /// A command in a replay script failed and `--strict` was given.
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

impl From<std::io::Error> for WinsyncError {
    fn from(err: std::io::Error) -> Self { Self::IoError(err.to_string()) }
}

impl From<ConfigError> for WinsyncError {
    fn from(err: ConfigError) -> Self { Self::ConfigError(err.to_string()) }
}

impl From<SessionError> for WinsyncError {
    fn from(err: SessionError) -> Self { Self::SessionError(err.to_string()) }
}

impl From<CommandError> for WinsyncError {
    fn from(err: CommandError) -> Self { Self::CommandFailed(err.to_string()) }
}

impl From<String> for WinsyncError {
    fn from(msg: String) -> Self { Self::InvalidArguments(msg) }
}
