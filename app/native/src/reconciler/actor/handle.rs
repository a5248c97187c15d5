//! Handle for communicating with the reconciler actor.
//!
//! The `ReconcilerHandle` provides a cloneable interface for sending control
//! messages to the actor.

use tokio::sync::{mpsc, oneshot};

use super::messages::{CommandRequest, CommandTicket, ReconcilerMessage};
use super::pending::SlotKey;
use crate::reconciler::error::CommandError;
use crate::reconciler::events::CommandTag;

/// Error types for actor communication.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    /// Failed to send message to actor.
    #[error("Failed to send message to actor: channel closed")]
    SendFailed,

    /// Failed to receive response from actor.
    #[error("Failed to receive response from actor: channel closed")]
    ReceiveFailed,
}

/// Handle for communicating with the reconciler actor.
///
/// This handle is cheap to clone and can be shared across threads.
#[derive(Clone, Debug)]
pub struct ReconcilerHandle {
    sender: mpsc::Sender<ReconcilerMessage>,
}

impl ReconcilerHandle {
    /// Create a new handle with the given sender.
    pub(crate) const fn new(sender: mpsc::Sender<ReconcilerMessage>) -> Self { Self { sender } }

    /// Installs a pending slot for a command.
    ///
    /// # Errors
    ///
    /// Returns the validation error from the actor, or
    /// [`CommandError::SessionClosed`] if the actor has stopped.
    pub async fn begin_command(&self, request: CommandRequest) -> Result<CommandTicket, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReconcilerMessage::BeginCommand { request, respond_to: tx })
            .await
            .map_err(|_| CommandError::SessionClosed)?;

        rx.await.map_err(|_| CommandError::SessionClosed)?
    }

    /// Drops the slot for a rejected request.
    ///
    /// Waits for room in the control channel, so the abort is queued ahead of
    /// anything the caller sends afterwards.
    pub async fn abort_command(&self, key: SlotKey, tag: CommandTag) {
        if self.sender.send(ReconcilerMessage::AbortCommand { key, tag }).await.is_err() {
            tracing::debug!("reconciler: actor gone before abort for {tag}");
        }
    }

    /// Waits until everything queued before this call has been processed.
    ///
    /// # Errors
    ///
    /// Returns an [`ActorError`] if the actor has stopped.
    pub async fn flush(&self) -> Result<u64, ActorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReconcilerMessage::Flush { respond_to: tx })
            .await
            .map_err(|_| ActorError::SendFailed)?;

        rx.await.map_err(|_| ActorError::ReceiveFailed)
    }

    /// Stops the actor and waits for it to acknowledge.
    ///
    /// # Errors
    ///
    /// Returns an [`ActorError`] if the actor has already stopped.
    pub async fn shutdown(&self) -> Result<(), ActorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReconcilerMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|_| ActorError::SendFailed)?;

        rx.await.map_err(|_| ActorError::ReceiveFailed)
    }

    /// Check if the actor is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool { !self.sender.is_closed() }

    /// Get the number of pending messages in the channel.
    #[must_use]
    pub fn pending_messages(&self) -> usize { self.sender.max_capacity() - self.sender.capacity() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::state::Attribute;

    #[tokio::test]
    async fn test_abort_waits_for_room_instead_of_dropping() {
        let (sender, mut receiver) = mpsc::channel(1);
        let handle = ReconcilerHandle::new(sender);

        // Fill the channel so the abort cannot be queued immediately.
        let (flush_tx, _flush_rx) = oneshot::channel();
        handle.sender.send(ReconcilerMessage::Flush { respond_to: flush_tx }).await.unwrap();

        let key = SlotKey::new(None, Attribute::Frontmost);
        let aborting = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.abort_command(key, CommandTag(7)).await })
        };
        tokio::task::yield_now().await;
        assert!(!aborting.is_finished());

        assert!(matches!(receiver.recv().await, Some(ReconcilerMessage::Flush { .. })));
        aborting.await.unwrap();
        assert!(matches!(
            receiver.recv().await,
            Some(ReconcilerMessage::AbortCommand { key: received, tag: CommandTag(7) }) if received == key
        ));
    }

    #[tokio::test]
    async fn test_abort_after_actor_stopped_is_harmless() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let handle = ReconcilerHandle::new(sender);

        handle.abort_command(SlotKey::new(None, Attribute::Frontmost), CommandTag(1)).await;
        assert!(!handle.is_alive());
    }
}
