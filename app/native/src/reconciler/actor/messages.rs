//! Control messages for the reconciler actor.
//!
//! Notifications do not travel through this channel; they arrive through the
//! normalizer queue. The control channel carries command transitions and
//! lifecycle requests.

use tokio::sync::oneshot;

use super::pending::{Responder, SlotKey};
use crate::reconciler::boundary::MutationRequest;
use crate::reconciler::commands::Mutation;
use crate::reconciler::error::CommandError;
use crate::reconciler::events::CommandTag;
use crate::reconciler::state::EntityId;

/// A command as submitted by the executor.
#[derive(Debug)]
pub struct CommandRequest {
    pub target: EntityId,
    pub mutation: Mutation,
    pub responder: Responder,
}

/// An installed command, ready to be performed.
#[derive(Clone, Debug)]
pub struct CommandTicket {
    pub key: SlotKey,
    pub request: MutationRequest,
}

/// Messages sent to the reconciler actor.
#[derive(Debug)]
pub enum ReconcilerMessage {
    /// Validate the target and install a pending slot.
    BeginCommand {
        request: CommandRequest,
        respond_to: oneshot::Sender<Result<CommandTicket, CommandError>>,
    },

    /// The window server rejected the request for `tag`.
    AbortCommand { key: SlotKey, tag: CommandTag },

    /// Process everything queued so far, then reply with the published version.
    Flush { respond_to: oneshot::Sender<u64> },

    /// Resolve pending commands, stop subscribers, and exit.
    Shutdown { respond_to: oneshot::Sender<()> },
}

impl ReconcilerMessage {
    /// Returns the message name for logging purposes.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BeginCommand { .. } => "BeginCommand",
            Self::AbortCommand { .. } => "AbortCommand",
            Self::Flush { .. } => "Flush",
            Self::Shutdown { .. } => "Shutdown",
        }
    }
}
