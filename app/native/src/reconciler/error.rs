//! Error types for the reconciler.
//!
//! Command errors travel only through a command's result. Everything else in
//! the reconciler is non-fatal: invalid notifications are dropped with a
//! diagnostic.

use serde::Serialize;

use super::state::{EntityId, EntityKind};

/// Errors resolving a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "error", content = "detail", rename_all = "camelCase")]
pub enum CommandError {
    /// The target is unknown or no longer live.
    #[error("target {0} not found")]
    NotFound(EntityId),

    /// No confirming notification arrived before the deadline.
    ///
    /// The OS state may still have changed.
    #[error("command timed out waiting for confirmation")]
    Timeout,

    /// A newer command for the same target and attribute replaced this one.
    #[error("command superseded by a newer command")]
    Superseded,

    /// The window server rejected the request synchronously.
    #[error("window server rejected the request: {0}")]
    BoundaryFailure(BoundaryError),

    /// The target was destroyed while the command was pending.
    #[error("target {0} was destroyed")]
    TargetDestroyed(EntityId),

    /// The mutation does not apply to the target's kind.
    #[error("mutation requires a {expected} target, got {actual}")]
    InvalidTarget {
        expected: &'static str,
        actual: &'static str,
    },

    /// The session was destroyed before the command resolved.
    #[error("session closed")]
    SessionClosed,
}

impl CommandError {
    pub(crate) const fn invalid_target(expected: EntityKind, actual: EntityKind) -> Self {
        Self::InvalidTarget { expected: expected.as_str(), actual: actual.as_str() }
    }
}

/// Errors from the entity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("entity {0} not found")]
    NotFound(EntityId),

    #[error("entity {0} is retired")]
    Retired(EntityId),

    #[error("parent {0} is retired")]
    ParentRetired(EntityId),

    #[error("entity index space exhausted")]
    Exhausted,
}

/// Errors reported by a window server implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BoundaryError {
    /// The OS refused the request.
    #[error("rejected ({code}): {message}")]
    Rejected { code: i32, message: String },

    /// The window server is not reachable (permissions, process gone).
    #[error("window server unavailable: {0}")]
    Unavailable(String),
}

/// Errors creating or driving a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `Session::create` was called outside a tokio runtime.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// The reconciler task has stopped.
    #[error("session closed")]
    Closed,

    /// Initial discovery failed.
    #[error("initial discovery failed: {0}")]
    Discovery(#[from] BoundaryError),

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}
