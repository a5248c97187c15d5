//! Pending command slots and notification classification.
//!
//! Every slot is keyed by `(entity, attribute)` and moves through:
//!
//! ```text
//!   Idle ──begin──► AwaitingConfirmation(tag, deadline, expected)
//!                     │            │              │
//!               matching     deadline passes   newer command /
//!             notification        │            target destroyed
//!                     │            ▼              │
//!                     ▼      Idle + grace record  ▼
//!                  Confirmed ──► Idle           Idle
//! ```
//!
//! All transitions run on the reconciler task. Each transition takes the
//! responder out of the table, so a command resolves exactly once.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::reconciler::commands::Confirmation;
use crate::reconciler::error::CommandError;
use crate::reconciler::events::CommandTag;
use crate::reconciler::state::{Attribute, EntityId, Value, WindowId};

/// Identifies a pending slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotKey {
    /// `None` only for the global frontmost pointer.
    pub entity: Option<EntityId>,
    pub attribute: Attribute,
}

impl SlotKey {
    #[must_use]
    pub const fn new(entity: Option<EntityId>, attribute: Attribute) -> Self { Self { entity, attribute } }
}

/// Completion side of a command.
pub type Responder = oneshot::Sender<Result<Confirmation, CommandError>>;

#[derive(Debug)]
struct AwaitingConfirmation {
    tag: CommandTag,
    target: EntityId,
    expected: Value,
    deadline: Instant,
    responder: Responder,
}

#[derive(Debug)]
struct GraceRecord {
    tag: CommandTag,
    expected: Value,
    until: Instant,
}

/// A confirmed command, resolved by the reconciler once the delta is published.
#[derive(Debug)]
pub struct Resolution {
    pub tag: CommandTag,
    pub responder: Responder,
}

impl Resolution {
    /// Resolves the command with the observed value.
    pub fn confirm(self, value: Value) {
        let tag = self.tag;
        if self.responder.send(Ok(Confirmation { tag, value })).is_err() {
            tracing::trace!("reconciler: {tag} confirmed but nobody is waiting");
        }
    }
}

/// Outcome of classifying an incoming change.
#[derive(Debug)]
pub enum Classification {
    /// Not caused by this session.
    External,
    /// Caused by a command; carries the command to resolve, if still pending.
    Internal(Option<Resolution>),
    /// Echo of a superseded command; must not touch the store.
    Stale,
}

/// The pending-slot table.
#[derive(Debug)]
pub struct PendingSlots {
    awaiting: HashMap<SlotKey, AwaitingConfirmation>,
    grace: HashMap<SlotKey, GraceRecord>,
    last_issued: HashMap<SlotKey, CommandTag>,
    next_tag: u64,
    timeout: Duration,
    grace_period: Duration,
    tolerance: f64,
}

impl PendingSlots {
    #[must_use]
    pub fn new(timeout: Duration, grace_period: Duration, tolerance: f64) -> Self {
        Self {
            awaiting: HashMap::new(),
            grace: HashMap::new(),
            last_issued: HashMap::new(),
            next_tag: 1,
            timeout,
            grace_period,
            tolerance,
        }
    }

    /// Installs a slot for a new command, superseding any command already
    /// awaiting on the same key.
    pub fn install(
        &mut self,
        key: SlotKey,
        target: EntityId,
        expected: Value,
        responder: Responder,
        now: Instant,
    ) -> CommandTag {
        let tag = CommandTag(self.next_tag);
        self.next_tag += 1;

        let slot = AwaitingConfirmation {
            tag,
            target,
            expected,
            deadline: now + self.timeout,
            responder,
        };

        if let Some(previous) = self.awaiting.insert(key, slot) {
            tracing::debug!("reconciler: {} superseded by {tag} on {key:?}", previous.tag);
            let _ = previous.responder.send(Err(CommandError::Superseded));
        }
        self.grace.remove(&key);
        self.last_issued.insert(key, tag);
        tag
    }

    /// Drops the slot for `tag` after a synchronous boundary rejection.
    pub fn abort(&mut self, key: SlotKey, tag: CommandTag) -> bool {
        if self.awaiting.get(&key).is_some_and(|slot| slot.tag == tag) {
            self.awaiting.remove(&key);
            return true;
        }
        false
    }

    /// Classifies a change to `key` carrying `value` and an optional echoed tag.
    pub fn classify(
        &mut self,
        key: SlotKey,
        tag: Option<CommandTag>,
        value: &Value,
        now: Instant,
    ) -> Classification {
        self.prune_grace(now);

        if let Some(tag) = tag
            && let Some(&last) = self.last_issued.get(&key)
            && tag <= last
        {
            if tag < last {
                return Classification::Stale;
            }
            if self.awaiting.get(&key).is_some_and(|slot| slot.tag == tag) {
                return Classification::Internal(self.take(key));
            }
            if self.grace.get(&key).is_some_and(|record| record.tag == tag) {
                self.grace.remove(&key);
                return Classification::Internal(None);
            }
            return Classification::External;
        }

        if self
            .awaiting
            .get(&key)
            .is_some_and(|slot| slot.expected.same_as(value, self.tolerance))
        {
            return Classification::Internal(self.take(key));
        }
        if self
            .grace
            .get(&key)
            .is_some_and(|record| record.expected.same_as(value, self.tolerance))
        {
            self.grace.remove(&key);
            return Classification::Internal(None);
        }
        Classification::External
    }

    fn take(&mut self, key: SlotKey) -> Option<Resolution> {
        self.awaiting
            .remove(&key)
            .map(|slot| Resolution { tag: slot.tag, responder: slot.responder })
    }

    /// Times out every slot whose deadline has passed, leaving grace records.
    ///
    /// Returns the number of commands resolved with `Timeout`.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<SlotKey> = self
            .awaiting
            .iter()
            .filter(|(_, slot)| slot.deadline <= now)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            if let Some(slot) = self.awaiting.remove(key) {
                tracing::debug!("reconciler: {} timed out on {key:?}", slot.tag);
                let _ = slot.responder.send(Err(CommandError::Timeout));
                self.grace.insert(
                    *key,
                    GraceRecord {
                        tag: slot.tag,
                        expected: slot.expected,
                        until: now + self.grace_period,
                    },
                );
            }
        }
        self.prune_grace(now);
        expired.len()
    }

    /// Resolves every command targeting `target`, or waiting for a pointer to
    /// it, with `TargetDestroyed`.
    pub fn cancel_target(&mut self, target: EntityId) -> usize {
        let pointer = WindowId::from_entity(target).map(|window| Value::Window(Some(window)));
        let keys: Vec<SlotKey> = self
            .awaiting
            .iter()
            .filter(|(key, slot)| {
                key.entity == Some(target)
                    || slot.target == target
                    || pointer.as_ref().is_some_and(|pointer| slot.expected == *pointer)
            })
            .map(|(key, _)| *key)
            .collect();

        for key in &keys {
            if let Some(slot) = self.awaiting.remove(key) {
                let _ = slot.responder.send(Err(CommandError::TargetDestroyed(target)));
            }
        }
        self.grace.retain(|key, _| key.entity != Some(target));
        self.last_issued.retain(|key, _| key.entity != Some(target));
        keys.len()
    }

    /// Resolves every pending command with `SessionClosed`.
    pub fn close_all(&mut self) -> usize {
        let count = self.awaiting.len();
        for (_, slot) in self.awaiting.drain() {
            let _ = slot.responder.send(Err(CommandError::SessionClosed));
        }
        self.grace.clear();
        count
    }

    /// Earliest deadline among awaiting slots.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> { self.awaiting.values().map(|s| s.deadline).min() }

    #[must_use]
    pub fn is_awaiting(&self, key: &SlotKey) -> bool { self.awaiting.contains_key(key) }

    #[must_use]
    pub fn len(&self) -> usize { self.awaiting.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.awaiting.is_empty() }

    fn prune_grace(&mut self, now: Instant) { self.grace.retain(|_, record| record.until > now); }
}

// ============================================================================
// Tests
// ============================================================================
