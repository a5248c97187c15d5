//! Synchronous reconciler state owned by the actor task.
//!
//! `ReconcilerCore` holds the registry, the writable snapshot, and the
//! pending-slot table. Everything here is synchronous so the handlers can be
//! driven directly in tests; the actor adds the channels and timers.

use tokio::time::Instant;

use super::handlers;
use super::messages::{CommandRequest, CommandTicket};
use super::pending::{Classification, PendingSlots, Resolution, SlotKey};
use crate::config::ReconcilerConfig;
use crate::reconciler::boundary::{MutationRequest, Operation};
use crate::reconciler::commands::Mutation;
use crate::reconciler::dispatch::Event;
use crate::reconciler::error::CommandError;
use crate::reconciler::events::{CommandTag, ObjectInfo, RawNotification};
use crate::reconciler::registry::EntityRegistry;
use crate::reconciler::state::{
    AppId, Attribute, AttributeDelta, Delta, EntityId, EntityKind, Snapshot, SnapshotStore, Value,
    WindowId,
};

/// Events and confirmations produced while processing, released only after
/// the snapshot is published.
#[derive(Debug, Default)]
pub struct Outbox {
    pub events: Vec<Event>,
    pub confirmations: Vec<(Resolution, Value)>,
}

/// Registry, store, and pending slots.
#[derive(Debug)]
pub struct ReconcilerCore {
    pub registry: EntityRegistry,
    pub store: SnapshotStore,
    pub pending: PendingSlots,
    pub outbox: Outbox,
    pub tolerance: f64,
    /// Time at which the current batch started.
    pub now: Instant,
}

impl ReconcilerCore {
    #[must_use]
    pub fn new(config: &ReconcilerConfig) -> Self {
        Self {
            registry: EntityRegistry::new(config.retired_retention),
            store: SnapshotStore::new(),
            pending: PendingSlots::new(
                config.command_timeout(),
                config.late_confirmation_grace(),
                config.frame_tolerance,
            ),
            outbox: Outbox::default(),
            tolerance: config.frame_tolerance,
            now: Instant::now(),
        }
    }

    /// The writer's current view.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot { self.store.current() }

    pub fn emit(&mut self, event: Event) {
        tracing::trace!("reconciler: emitting {} (external={})", event.kind(), event.is_external());
        self.outbox.events.push(event);
    }

    /// Takes the outbox contents.
    pub fn take_outbox(&mut self) -> Outbox { std::mem::take(&mut self.outbox) }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Processes one raw notification.
    pub fn process(&mut self, notification: RawNotification) {
        match notification {
            RawNotification::Created { object } => handlers::on_created(self, object),
            RawNotification::Destroyed { object } => handlers::on_destroyed(self, object),
            RawNotification::Changed { object, value, tag } => {
                handlers::on_changed(self, object, value, tag);
            }
            RawNotification::FrontmostChanged { pid, tag } => {
                handlers::on_frontmost_changed(self, pid, tag);
            }
            RawNotification::ActiveSpacesChanged { space_ids } => {
                handlers::on_active_spaces_changed(self, &space_ids);
            }
            RawNotification::SpaceWillChange => handlers::on_space_will_change(self),
        }
    }

    /// Applies the initially discovered world without emitting events.
    pub fn seed(&mut self, mut objects: Vec<ObjectInfo>) {
        objects.sort_by_key(ObjectInfo::depth);
        let count = objects.len();
        for object in objects {
            handlers::on_created(self, object);
        }
        let discarded = self.take_outbox();
        for (resolution, value) in discarded.confirmations {
            resolution.confirm(value);
        }
        tracing::debug!(
            "reconciler: seeded {count} objects ({} events suppressed)",
            discarded.events.len()
        );
    }

    /// Runs the classify-and-apply steps for one attribute change.
    ///
    /// Returns the applied delta and whether it was external, or `None` if
    /// nothing changed (including stale echoes of superseded commands).
    pub fn reconcile(
        &mut self,
        key: SlotKey,
        new: Value,
        tag: Option<CommandTag>,
    ) -> Option<(AttributeDelta, bool)> {
        let delta = self.snapshot().diff(key.entity, key.attribute, &new, self.tolerance);

        let external = match self.pending.classify(key, tag, &new, self.now) {
            Classification::Stale => {
                tracing::debug!("reconciler: ignoring stale echo on {key:?} ({tag:?})");
                return None;
            }
            Classification::External => true,
            Classification::Internal(resolution) => {
                if let Some(resolution) = resolution {
                    self.outbox.confirmations.push((resolution, new));
                }
                false
            }
        };

        let delta = delta?;
        self.store.apply(&Delta::Changed(delta.clone()));
        Some((delta, external))
    }

    /// Reconciles a change and emits the matching event.
    pub fn reconcile_and_emit(&mut self, key: SlotKey, new: Value, tag: Option<CommandTag>) {
        if let Some((delta, external)) = self.reconcile(key, new, tag)
            && let Some(event) = handlers::change_event(self.snapshot(), &delta, external)
        {
            self.emit(event);
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Validates a command and installs its pending slot.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotFound`] or [`CommandError::InvalidTarget`].
    pub fn begin_command(&mut self, request: CommandRequest) -> Result<CommandTicket, CommandError> {
        let CommandRequest { target, mutation, responder } = request;

        let record = self.registry.resolve_live(target).map_err(|_| CommandError::NotFound(target))?;
        let os_ref = record.os_ref;
        if target.kind() != mutation.target_kind() {
            return Err(CommandError::invalid_target(mutation.target_kind(), target.kind()));
        }

        let (expected, operation) = self.plan(target, &mutation)?;
        let entity = (mutation.attribute() != Attribute::Frontmost).then_some(target);
        let key = SlotKey::new(entity, mutation.attribute());
        let tag = self.pending.install(key, target, expected, responder, self.now);

        Ok(CommandTicket { key, request: MutationRequest { tag, target: os_ref, operation } })
    }

    /// Computes the expected value and the OS operation for a mutation.
    fn plan(&self, target: EntityId, mutation: &Mutation) -> Result<(Value, Operation), CommandError> {
        let snapshot = self.snapshot();
        let current_frame = || {
            snapshot
                .window(WindowId::assume(target))
                .map(|w| w.frame)
                .ok_or(CommandError::NotFound(target))
        };

        let plan = match *mutation {
            Mutation::SetFrame(frame) => (Value::Frame(frame), Operation::SetFrame(frame)),
            Mutation::SetPosition(origin) => {
                (Value::Frame(current_frame()?.with_origin(origin)), Operation::SetPosition(origin))
            }
            Mutation::SetSize(size) => {
                (Value::Frame(current_frame()?.with_size(size)), Operation::SetSize(size))
            }
            Mutation::SetMinimized(flag) => (Value::Flag(flag), Operation::SetMinimized(flag)),
            Mutation::SetFullscreen(flag) => (Value::Flag(flag), Operation::SetFullscreen(flag)),
            Mutation::SetHidden(flag) => (Value::Flag(flag), Operation::SetHidden(flag)),
            Mutation::SetMainWindow(window) => {
                let record = snapshot
                    .window(window)
                    .ok_or_else(|| CommandError::NotFound(window.entity()))?;
                if record.app != AppId::assume(target) {
                    return Err(CommandError::invalid_target(EntityKind::Application, EntityKind::Window));
                }
                (
                    Value::Window(Some(window)),
                    Operation::SetMainWindow { window_number: record.window_number },
                )
            }
            Mutation::SetFrontmost => {
                (Value::App(Some(AppId::assume(target))), Operation::SetFrontmost)
            }
        };
        Ok(plan)
    }

    /// Drops a slot after a boundary rejection.
    pub fn abort_command(&mut self, key: SlotKey, tag: CommandTag) {
        if self.pending.abort(key, tag) {
            tracing::debug!("reconciler: aborted {tag} on {key:?}");
        }
    }

    /// Times out expired slots.
    pub fn expire(&mut self, now: Instant) {
        self.now = now;
        let expired = self.pending.expire(now);
        if expired > 0 {
            tracing::debug!("reconciler: {expired} command(s) timed out");
        }
    }

    /// Resolves every pending command with `SessionClosed`.
    pub fn close(&mut self) {
        let closed = self.pending.close_all();
        if closed > 0 {
            tracing::debug!("reconciler: closed {closed} pending command(s)");
        }
    }
}
