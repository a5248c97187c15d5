//! Reconciler actor.
//!
//! The actor owns the registry, the writable snapshot, and the pending-slot
//! table, and is the only task that mutates any of them. It waits on three
//! sources in priority order:
//!
//! 1. control messages (command begin/abort, flush, shutdown)
//! 2. notification batches from the normalizer
//! 3. the earliest pending-slot deadline
//!
//! After every unit of work the outbox is released: the snapshot is
//! published first, then confirmed commands resolve, then events are
//! dispatched. A command future therefore never resolves before its effect
//! is readable, and a subscriber never sees an event ahead of the snapshot.
//!
//! # Panic Recovery
//!
//! Each notification and control message is handled inside `catch_unwind`.
//! A panic is logged and the loop continues with the next item.

pub mod core;
mod handle;
pub mod handlers;
pub(crate) mod messages;
pub mod pending;

use std::panic::{AssertUnwindSafe, catch_unwind};

pub use handle::{ActorError, ReconcilerHandle};
pub use messages::{CommandRequest, CommandTicket};
pub use pending::SlotKey;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use self::core::ReconcilerCore;
use self::messages::ReconcilerMessage;
use super::dispatch::EventDispatcher;
use super::events::{NotificationStream, RawNotification};
use super::panic_message;

/// The reconciler task.
pub struct Reconciler {
    core: ReconcilerCore,
    receiver: mpsc::Receiver<ReconcilerMessage>,
    notifications: NotificationStream,
    dispatcher: EventDispatcher,
}

impl Reconciler {
    /// Builds the actor around an already seeded core.
    #[must_use]
    pub fn new(
        core: ReconcilerCore,
        notifications: NotificationStream,
        dispatcher: EventDispatcher,
        channel_capacity: usize,
    ) -> (Self, ReconcilerHandle) {
        let (sender, receiver) = mpsc::channel(channel_capacity.max(1));
        let actor = Self { core, receiver, notifications, dispatcher };
        (actor, ReconcilerHandle::new(sender))
    }

    /// Spawns the message loop on `runtime`.
    pub fn spawn(self, runtime: &Handle) -> JoinHandle<()> {
        tracing::debug!("reconciler: spawning actor");
        runtime.spawn(self.run())
    }

    async fn run(mut self) {
        tracing::trace!("reconciler: actor loop starting");
        let mut stream_open = true;

        // Publish whatever seeding produced before anyone waits on us.
        self.release();

        loop {
            self.expire();
            let deadline = self.core.pending.next_deadline();

            tokio::select! {
                biased;

                msg = self.receiver.recv() => {
                    let Some(msg) = msg else {
                        break;
                    };
                    if let ReconcilerMessage::Shutdown { respond_to } = msg {
                        self.shutdown(respond_to).await;
                        return;
                    }
                    self.handle_guarded(msg);
                }

                batch = self.notifications.next_batch(), if stream_open => {
                    match batch {
                        Some(batch) => self.process_batch(batch),
                        None => {
                            tracing::debug!("reconciler: notification stream closed");
                            stream_open = false;
                        }
                    }
                }

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire();
                }
            }
        }

        // Every handle is gone; nobody can observe a graceful shutdown.
        tracing::debug!("reconciler: control channel closed, exiting");
        self.core.close();
        self.notifications.close();
        self.dispatcher.close();
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn process_batch(&mut self, batch: Vec<RawNotification>) {
        self.core.now = Instant::now();
        tracing::trace!("reconciler: processing batch of {}", batch.len());

        for notification in batch {
            let name = notification.name();
            let result = catch_unwind(AssertUnwindSafe(|| self.core.process(notification)));
            if let Err(panic) = result {
                tracing::error!(
                    "reconciler: PANIC while handling '{name}': {}",
                    panic_message(panic.as_ref())
                );
            }
        }
        self.release();
    }

    /// Processes notifications that are already queued.
    fn drain_queued(&mut self) {
        let batch = self.notifications.try_next_batch();
        if !batch.is_empty() {
            self.process_batch(batch);
        }
    }

    fn expire(&mut self) {
        self.core.expire(Instant::now());
    }

    /// Publishes the snapshot, resolves confirmations, then dispatches events.
    fn release(&mut self) -> u64 {
        let outbox = self.core.take_outbox();
        let version = self.core.store.publish();

        for (resolution, value) in outbox.confirmations {
            resolution.confirm(value);
        }
        for event in outbox.events {
            self.dispatcher.dispatch(event);
        }
        version
    }

    // ========================================================================
    // Control Messages
    // ========================================================================

    fn handle_guarded(&mut self, msg: ReconcilerMessage) {
        let name = msg.name();
        let result = catch_unwind(AssertUnwindSafe(|| self.handle_message(msg)));
        if let Err(panic) = result {
            tracing::error!(
                "reconciler: PANIC while handling '{name}': {}",
                panic_message(panic.as_ref())
            );
        }
    }

    fn handle_message(&mut self, msg: ReconcilerMessage) {
        match msg {
            ReconcilerMessage::BeginCommand { request, respond_to } => {
                // Install against the latest state the OS has reported.
                self.drain_queued();
                self.core.now = Instant::now();
                let result = self.core.begin_command(request);
                if let Err(err) = &result {
                    tracing::debug!("reconciler: command rejected: {err}");
                }
                if respond_to.send(result).is_err() {
                    tracing::debug!("reconciler: command submitter went away");
                }
            }
            ReconcilerMessage::AbortCommand { key, tag } => {
                self.core.abort_command(key, tag);
            }
            ReconcilerMessage::Flush { respond_to } => {
                self.drain_queued();
                let version = self.release();
                if respond_to.send(version).is_err() {
                    tracing::trace!("reconciler: flush requester went away");
                }
            }
            // Handled in run().
            ReconcilerMessage::Shutdown { respond_to } => {
                let _ = respond_to.send(());
            }
        }
    }

    async fn shutdown(&mut self, respond_to: oneshot::Sender<()>) {
        tracing::debug!("reconciler: shutting down");
        self.core.close();
        self.notifications.close();
        // Events still in the outbox are discarded along with the mailboxes.
        let _ = self.core.take_outbox();
        self.core.store.publish();
        self.dispatcher.shutdown().await;
        if respond_to.send(()).is_err() {
            tracing::trace!("reconciler: shutdown requester went away");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
