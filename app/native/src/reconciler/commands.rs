//! Command executor: consumer mutations with exactly-once completion.
//!
//! Submitting a command:
//! 1. asks the reconciler to validate the target and install a pending slot
//!    (superseding an older command on the same slot)
//! 2. calls [`WindowServer::perform`] with the slot's tag
//! 3. returns a [`PendingCommand`] future that resolves when the reconciler
//!    sees the confirming notification, the deadline passes, or the slot is
//!    cancelled
//!
//! A synchronous rejection from the window server aborts the slot and is
//! reported as [`CommandError::BoundaryFailure`] at submission.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::actor::{CommandRequest, ReconcilerHandle};
use super::boundary::WindowServer;
use super::error::CommandError;
use super::events::CommandTag;
use super::state::{Attribute, EntityId, EntityKind, Point, Rect, Size, Value, WindowId};

/// A consumer-requested mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mutation", content = "value", rename_all = "camelCase")]
pub enum Mutation {
    SetFrame(Rect),
    SetPosition(Point),
    SetSize(Size),
    SetMinimized(bool),
    SetFullscreen(bool),
    SetHidden(bool),
    SetMainWindow(WindowId),
    SetFrontmost,
}

impl Mutation {
    /// The attribute whose pending slot this mutation occupies.
    #[must_use]
    pub const fn attribute(&self) -> Attribute {
        match self {
            Self::SetFrame(_) | Self::SetPosition(_) | Self::SetSize(_) => Attribute::Frame,
            Self::SetMinimized(_) => Attribute::Minimized,
            Self::SetFullscreen(_) => Attribute::Fullscreen,
            Self::SetHidden(_) => Attribute::Hidden,
            Self::SetMainWindow(_) => Attribute::MainWindow,
            Self::SetFrontmost => Attribute::Frontmost,
        }
    }

    /// The entity kind the mutation must target.
    #[must_use]
    pub const fn target_kind(&self) -> EntityKind {
        match self {
            Self::SetFrame(_)
            | Self::SetPosition(_)
            | Self::SetSize(_)
            | Self::SetMinimized(_)
            | Self::SetFullscreen(_) => EntityKind::Window,
            Self::SetHidden(_) | Self::SetMainWindow(_) | Self::SetFrontmost => {
                EntityKind::Application
            }
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetFrame(_) => "SetFrame",
            Self::SetPosition(_) => "SetPosition",
            Self::SetSize(_) => "SetSize",
            Self::SetMinimized(_) => "SetMinimized",
            Self::SetFullscreen(_) => "SetFullscreen",
            Self::SetHidden(_) => "SetHidden",
            Self::SetMainWindow(_) => "SetMainWindow",
            Self::SetFrontmost => "SetFrontmost",
        }
    }
}

/// Successful completion of a command.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub tag: CommandTag,
    /// The value the OS reported, which may differ from the requested one.
    pub value: Value,
}

/// A submitted command awaiting its outcome.
#[derive(Debug)]
#[must_use = "a pending command resolves only when awaited"]
pub struct PendingCommand {
    tag: CommandTag,
    target: EntityId,
    receiver: oneshot::Receiver<Result<Confirmation, CommandError>>,
}

impl PendingCommand {
    #[must_use]
    pub const fn tag(&self) -> CommandTag { self.tag }

    #[must_use]
    pub const fn target(&self) -> EntityId { self.target }
}

impl Future for PendingCommand {
    type Output = Result<Confirmation, CommandError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(CommandError::SessionClosed)))
    }
}

/// Submits mutations. Cheap to clone.
#[derive(Clone)]
pub struct CommandExecutor {
    handle: ReconcilerHandle,
    server: Arc<dyn WindowServer>,
}

impl CommandExecutor {
    pub(crate) fn new(handle: ReconcilerHandle, server: Arc<dyn WindowServer>) -> Self {
        Self { handle, server }
    }

    /// Submits a mutation and returns its pending completion.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotFound`] or [`CommandError::InvalidTarget`]
    /// if the target cannot take the mutation, [`CommandError::BoundaryFailure`]
    /// if the window server rejects it, or [`CommandError::SessionClosed`].
    pub async fn submit(
        &self,
        target: impl Into<EntityId>,
        mutation: Mutation,
    ) -> Result<PendingCommand, CommandError> {
        let target = target.into();
        let name = mutation.name();
        let (responder, receiver) = oneshot::channel();

        let ticket = self.handle.begin_command(CommandRequest { target, mutation, responder }).await?;
        tracing::debug!("reconciler: {name} on {target} issued as {}", ticket.request.tag);

        if let Err(err) = self.server.perform(&ticket.request) {
            tracing::warn!("reconciler: {name} on {target} rejected: {err}");
            self.handle.abort_command(ticket.key, ticket.request.tag).await;
            return Err(CommandError::BoundaryFailure(err));
        }

        Ok(PendingCommand { tag: ticket.request.tag, target, receiver })
    }

    /// Submits a mutation and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::submit`], or the command's resolution error.
    pub async fn execute(
        &self,
        target: impl Into<EntityId>,
        mutation: Mutation,
    ) -> Result<Confirmation, CommandError> {
        self.submit(target, mutation).await?.await
    }
}
