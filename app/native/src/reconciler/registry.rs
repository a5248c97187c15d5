//! Entity registry: stable generational identities for OS objects.
//!
//! The registry maps opaque OS references ([`OsRef`]) to [`EntityId`]s and
//! tracks the parent/child relation used for retirement cascades:
//! - screen → spaces
//! - application → windows
//!
//! Retired slots stay resolvable (as [`RecordState::Retired`]) until they are
//! recycled. A slot is only recycled once more than `retention` other slots
//! have been retired after it, and recycling bumps its generation, so an old
//! id never aliases a newer object.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::error::RegistryError;
use super::state::{EntityId, EntityKind};

// ============================================================================
// OS References
// ============================================================================

/// Opaque reference to an object as the window server knows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OsRef {
    Screen { display_id: u32 },
    Space { space_id: u64 },
    Application { pid: i32 },
    Window { pid: i32, window_number: u32 },
}

impl OsRef {
    /// The entity kind this reference resolves to.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Screen { .. } => EntityKind::Screen,
            Self::Space { .. } => EntityKind::Space,
            Self::Application { .. } => EntityKind::Application,
            Self::Window { .. } => EntityKind::Window,
        }
    }
}

impl fmt::Display for OsRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Screen { display_id } => write!(f, "screen(display={display_id})"),
            Self::Space { space_id } => write!(f, "space({space_id})"),
            Self::Application { pid } => write!(f, "app(pid={pid})"),
            Self::Window { pid, window_number } => write!(f, "window(pid={pid}, #{window_number})"),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// Lifecycle state of a registry record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordState {
    Live,
    Retired,
}

/// A registry entry.
#[derive(Clone, Debug)]
pub struct EntityRecord {
    pub id: EntityId,
    pub os_ref: OsRef,
    pub parent: Option<EntityId>,
    pub children: SmallVec<[EntityId; 8]>,
    pub state: RecordState,
}

impl EntityRecord {
    #[must_use]
    pub fn is_live(&self) -> bool { self.state == RecordState::Live }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<EntityRecord>,
}

// ============================================================================
// Registry
// ============================================================================

/// Maps OS references to generational ids. Owned by the reconciler task.
#[derive(Debug)]
pub struct EntityRegistry {
    slots: Vec<Slot>,
    by_os_ref: HashMap<OsRef, EntityId>,
    retired: VecDeque<u32>,
    retention: usize,
}

impl EntityRegistry {
    /// Creates an empty registry that keeps `retention` retired slots
    /// resolvable before recycling any of them.
    #[must_use]
    pub fn new(retention: usize) -> Self {
        Self {
            slots: Vec::new(),
            by_os_ref: HashMap::new(),
            retired: VecDeque::new(),
            retention,
        }
    }

    /// Returns the live id for `os_ref`, registering it under `parent` if unknown.
    ///
    /// The boolean is `true` when a new record was created.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ParentRetired`] if `parent` is not live.
    pub fn register_or_lookup(
        &mut self,
        os_ref: OsRef,
        parent: Option<EntityId>,
    ) -> Result<(EntityId, bool), RegistryError> {
        if let Some(&id) = self.by_os_ref.get(&os_ref) {
            return Ok((id, false));
        }

        if let Some(parent) = parent
            && !self.is_live(parent)
        {
            return Err(RegistryError::ParentRetired(parent));
        }

        let record_for = |id| EntityRecord {
            id,
            os_ref,
            parent,
            children: SmallVec::new(),
            state: RecordState::Live,
        };

        let id = if self.retired.len() > self.retention
            && let Some(index) = self.retired.pop_front()
        {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            let id = EntityId::new(os_ref.kind(), index, slot.generation);
            slot.record = Some(record_for(id));
            id
        } else {
            let index = u32::try_from(self.slots.len()).map_err(|_| RegistryError::Exhausted)?;
            let id = EntityId::new(os_ref.kind(), index, 0);
            self.slots.push(Slot { generation: 0, record: Some(record_for(id)) });
            id
        };

        self.by_os_ref.insert(os_ref, id);
        if let Some(parent) = parent
            && let Some(record) = self.record_mut(parent)
        {
            record.children.push(id);
        }

        tracing::trace!("reconciler: registered {os_ref} as {id}");
        Ok((id, true))
    }

    /// Returns the live id for `os_ref`, if any.
    #[must_use]
    pub fn lookup(&self, os_ref: &OsRef) -> Option<EntityId> { self.by_os_ref.get(os_ref).copied() }

    /// Resolves an id to its record, live or retired.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the id was never issued or its
    /// slot has since been recycled.
    pub fn resolve(&self, id: EntityId) -> Result<&EntityRecord, RegistryError> {
        self.slots
            .get(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_ref())
            .filter(|record| record.id == id)
            .ok_or(RegistryError::NotFound(id))
    }

    /// Resolves an id and requires the record to be live.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] or [`RegistryError::Retired`].
    pub fn resolve_live(&self, id: EntityId) -> Result<&EntityRecord, RegistryError> {
        let record = self.resolve(id)?;
        if record.is_live() { Ok(record) } else { Err(RegistryError::Retired(id)) }
    }

    #[must_use]
    pub fn is_live(&self, id: EntityId) -> bool { self.resolve(id).is_ok_and(EntityRecord::is_live) }

    /// Retires `id` and all of its descendants.
    ///
    /// Returns the retired ids with children before their parent. Retiring an
    /// id that is already retired (or unknown) returns an empty list.
    pub fn retire(&mut self, id: EntityId) -> Vec<EntityId> {
        if !self.is_live(id) {
            return Vec::new();
        }

        let mut order = Vec::new();
        self.collect_post_order(id, &mut order);

        for &retired in &order {
            if let Some(record) = self.record_mut(retired) {
                record.state = RecordState::Retired;
                record.children.clear();
                let os_ref = record.os_ref;
                self.by_os_ref.remove(&os_ref);
                self.retired.push_back(retired.index());
            }
        }

        let parent = self.resolve(id).ok().and_then(|record| record.parent);
        if let Some(parent) = parent
            && let Some(record) = self.record_mut(parent)
        {
            record.children.retain(|child| *child != id);
        }

        tracing::trace!("reconciler: retired {id} ({} records)", order.len());
        order
    }

    /// Number of live records.
    #[must_use]
    pub fn live_count(&self) -> usize { self.by_os_ref.len() }

    fn collect_post_order(&self, id: EntityId, out: &mut Vec<EntityId>) {
        if let Ok(record) = self.resolve(id) {
            for &child in &record.children {
                self.collect_post_order(child, out);
            }
        }
        out.push(id);
    }

    fn record_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_mut())
    }
}

// ============================================================================
// Tests
// ============================================================================
