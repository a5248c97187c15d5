//! Single-writer snapshot store with observable publication.
//!
//! The reconciler owns the [`SnapshotStore`] and mutates a working copy.
//! Readers hold a [`SnapshotReader`] and always see the last published
//! `Arc<Snapshot>`; publication is a pointer swap through an eyeball
//! `SharedObservable`, so reads never block the writer.

use std::sync::Arc;

use eyeball::{SharedObservable, Subscriber};

use super::delta::Delta;
use super::snapshot::Snapshot;

/// Writable side of the snapshot. Owned by the reconciler task.
#[derive(Debug)]
pub struct SnapshotStore {
    working: Arc<Snapshot>,
    published: SharedObservable<Arc<Snapshot>>,
    dirty: bool,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        let working = Arc::new(Snapshot::default());
        let published = SharedObservable::new(Arc::clone(&working));
        Self { working, published, dirty: false }
    }

    /// Returns a cloneable read handle.
    #[must_use]
    pub fn reader(&self) -> SnapshotReader { SnapshotReader { inner: self.published.clone() } }

    /// The writer's current view, including unpublished deltas.
    #[must_use]
    pub fn current(&self) -> &Snapshot { &self.working }

    /// Applies a delta to the working copy. Returns true if it changed state.
    ///
    /// The working copy is cloned on the first write after a publication
    /// while readers still hold the published pointer.
    pub fn apply(&mut self, delta: &Delta) -> bool {
        let snapshot = Arc::make_mut(&mut self.working);
        if !snapshot.apply(delta) {
            return false;
        }
        snapshot.bump_version();
        self.dirty = true;
        true
    }

    /// Publishes the working copy if it changed since the last publication.
    ///
    /// Returns the published version.
    pub fn publish(&mut self) -> u64 {
        if self.dirty {
            self.published.set(Arc::clone(&self.working));
            self.dirty = false;
            tracing::trace!("reconciler: published snapshot v{}", self.working.version());
        }
        self.working.version()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self { Self::new() }
}

/// Read handle on the published snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotReader {
    inner: SharedObservable<Arc<Snapshot>>,
}

impl SnapshotReader {
    /// The last published snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<Snapshot> { self.inner.get() }

    /// Subscribes to publications.
    #[must_use]
    pub fn subscribe(&self) -> Subscriber<Arc<Snapshot>> { self.inner.subscribe() }
}

#[cfg(test)]
mod tests {
    use smallvec::SmallVec;

    use super::*;
    use crate::reconciler::state::{AppId, Application, EntityId, EntityKind, Entity};

    fn app_delta(index: u32) -> Delta {
        Delta::Created(Entity::Application(Application {
            id: AppId::assume(EntityId::new(EntityKind::Application, index, 0)),
            pid: 1,
            bundle_id: None,
            name: "App".to_string(),
            is_hidden: false,
            main_window: None,
            focused_window: None,
            windows: SmallVec::new(),
        }))
    }

    #[test]
    fn test_readers_see_only_published_state() {
        let mut store = SnapshotStore::new();
        let reader = store.reader();

        assert!(store.apply(&app_delta(0)));
        assert_eq!(store.current().applications().len(), 1);
        assert!(reader.get().applications().is_empty());

        assert_eq!(store.publish(), 1);
        assert_eq!(reader.get().applications().len(), 1);
    }

    #[test]
    fn test_noop_delta_does_not_bump_version() {
        let mut store = SnapshotStore::new();
        store.apply(&app_delta(0));
        store.publish();

        assert!(!store.apply(&app_delta(0)));
        assert_eq!(store.publish(), 1);
    }

    #[test]
    fn test_published_snapshot_is_immutable() {
        let mut store = SnapshotStore::new();
        store.apply(&app_delta(0));
        store.publish();

        let held = store.reader().get();
        store.apply(&Delta::Destroyed(EntityId::new(EntityKind::Application, 0, 0)));
        store.publish();

        assert_eq!(held.applications().len(), 1);
        assert!(store.reader().get().applications().is_empty());
    }
}
