//! Notification normalizer: the boundary queue between the OS binding and the
//! reconciler.
//!
//! The normalizer is responsible for:
//! - Accepting notifications from any thread without blocking
//! - Coalescing queued changes to the same (object, attribute) in place
//! - Dropping duplicate creations of an already-queued object
//! - Compacting under backpressure without ever dropping structural events
//!
//! # Sealing
//!
//! A creation or destruction seals every open coalescing key of its object, so
//! a change queued before a destroy is never merged with a change after the
//! object is re-created.
//!
//! A creation also seals the keys whose values can point at the new object:
//! the frontmost pointer for applications (and windows, which may launch their
//! application implicitly), the owning application's main and focused window
//! pointers for windows, and the active-space list for spaces. A later value
//! naming the new object therefore always lands after its creation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use smallvec::{SmallVec, smallvec};
use tokio::sync::Notify;

use super::types::RawNotification;
use crate::reconciler::registry::OsRef;
use crate::reconciler::state::Attribute;

/// Key under which queued notifications coalesce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum CoalesceKey {
    Attribute(OsRef, Attribute),
    Frontmost,
    ActiveSpaces,
    SpaceWillChange,
}

impl CoalesceKey {
    fn of(notification: &RawNotification) -> Option<Self> {
        match notification {
            RawNotification::Changed { object, value, .. } => {
                Some(Self::Attribute(*object, value.attribute()))
            }
            RawNotification::FrontmostChanged { .. } => Some(Self::Frontmost),
            RawNotification::ActiveSpacesChanged { .. } => Some(Self::ActiveSpaces),
            RawNotification::SpaceWillChange => Some(Self::SpaceWillChange),
            RawNotification::Created { .. } | RawNotification::Destroyed { .. } => None,
        }
    }

    fn object(&self) -> Option<OsRef> {
        match self {
            Self::Attribute(object, _) => Some(*object),
            _ => None,
        }
    }

    /// Keys whose values may refer to `created`.
    fn referring_to(created: OsRef) -> SmallVec<[Self; 3]> {
        match created {
            OsRef::Application { .. } => smallvec![Self::Frontmost],
            OsRef::Window { pid, .. } => {
                let app = OsRef::Application { pid };
                smallvec![
                    Self::Attribute(app, Attribute::MainWindow),
                    Self::Attribute(app, Attribute::FocusedWindow),
                    Self::Frontmost,
                ]
            }
            OsRef::Space { .. } => smallvec![Self::ActiveSpaces],
            OsRef::Screen { .. } => SmallVec::new(),
        }
    }
}

/// Counters describing what the normalizer did with its input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizerStats {
    pub received: u64,
    pub coalesced: u64,
    pub duplicates: u64,
    pub compacted: u64,
    /// Compaction scans of the queue.
    pub compaction_passes: u64,
}

#[derive(Debug)]
struct Queue {
    /// Entries by sequence number; compacted entries become `None`.
    entries: VecDeque<Option<RawNotification>>,
    head_seq: u64,
    live: usize,
    open: HashMap<CoalesceKey, u64>,
    queued_creates: HashSet<OsRef>,
    queued_destroys: HashMap<OsRef, u64>,
    capacity: usize,
    overflowing: bool,
    /// A destruction was queued since the last compaction pass.
    destroy_since_compaction: bool,
    stats: NormalizerStats,
}

impl Queue {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            head_seq: 0,
            live: 0,
            open: HashMap::new(),
            queued_creates: HashSet::new(),
            queued_destroys: HashMap::new(),
            capacity,
            overflowing: false,
            destroy_since_compaction: false,
            stats: NormalizerStats::default(),
        }
    }

    fn next_seq(&self) -> u64 { self.head_seq + self.entries.len() as u64 }

    fn slot_mut(&mut self, seq: u64) -> Option<&mut Option<RawNotification>> {
        let offset = usize::try_from(seq.checked_sub(self.head_seq)?).ok()?;
        self.entries.get_mut(offset)
    }

    fn push_back(&mut self, notification: RawNotification) -> u64 {
        let seq = self.next_seq();
        self.entries.push_back(Some(notification));
        self.live += 1;
        seq
    }

    fn seal(&mut self, object: OsRef) { self.open.retain(|key, _| key.object() != Some(object)); }

    fn seal_references(&mut self, created: OsRef) {
        for key in CoalesceKey::referring_to(created) {
            self.open.remove(&key);
        }
    }

    fn push(&mut self, notification: RawNotification) {
        self.stats.received += 1;

        if let Some(key) = CoalesceKey::of(&notification) {
            if let Some(seq) = self.open.get(&key).copied()
                && let Some(Some(queued)) = self.slot_mut(seq)
            {
                merge_into(queued, notification);
                self.stats.coalesced += 1;
                return;
            }

            if key == CoalesceKey::ActiveSpaces {
                self.open.remove(&CoalesceKey::SpaceWillChange);
            }
            let seq = self.push_back(notification);
            self.open.insert(key, seq);
        } else {
            match &notification {
                RawNotification::Created { object } => {
                    let os_ref = object.os_ref();
                    if self.queued_creates.contains(&os_ref) {
                        self.stats.duplicates += 1;
                        tracing::trace!("reconciler: dropping duplicate creation of {os_ref}");
                        return;
                    }
                    self.seal(os_ref);
                    self.seal_references(os_ref);
                    self.queued_creates.insert(os_ref);
                    self.queued_destroys.remove(&os_ref);
                }
                RawNotification::Destroyed { object } => {
                    let os_ref = *object;
                    self.seal(os_ref);
                    self.queued_creates.remove(&os_ref);
                    let seq = self.next_seq();
                    self.queued_destroys.insert(os_ref, seq);
                    self.destroy_since_compaction = true;
                }
                _ => {}
            }
            self.push_back(notification);
        }

        if self.live > self.capacity {
            // Compaction only frees changes that precede a queued destruction,
            // so rescanning without a new one cannot drop anything.
            if self.destroy_since_compaction {
                self.compact();
            }
            self.check_capacity();
        }
    }

    /// Drops queued attribute changes for objects whose destruction is queued
    /// after them. Creations and destructions are never dropped.
    fn compact(&mut self) {
        let head = self.head_seq;
        let mut dropped = 0_usize;
        self.destroy_since_compaction = false;
        self.stats.compaction_passes += 1;

        for (offset, entry) in self.entries.iter_mut().enumerate() {
            let seq = head + offset as u64;
            let doomed = match entry.as_ref() {
                Some(RawNotification::Changed { object, .. }) => {
                    self.queued_destroys.get(object).is_some_and(|destroy| *destroy > seq)
                }
                _ => false,
            };
            if doomed {
                *entry = None;
                dropped += 1;
            }
        }

        if dropped > 0 {
            self.live -= dropped;
            self.stats.compacted += dropped as u64;
            let entries = &self.entries;
            self.open.retain(|_, seq| {
                usize::try_from(*seq - head)
                    .ok()
                    .and_then(|offset| entries.get(offset))
                    .is_some_and(Option::is_some)
            });
        }
    }

    fn check_capacity(&mut self) {
        if self.live > self.capacity {
            if !self.overflowing {
                tracing::warn!(
                    "reconciler: notification queue over capacity ({} > {}) after compaction",
                    self.live,
                    self.capacity
                );
            }
            self.overflowing = true;
        } else {
            self.overflowing = false;
        }
    }

    fn drain(&mut self) -> Vec<RawNotification> {
        self.head_seq += self.entries.len() as u64;
        let batch: Vec<RawNotification> = self.entries.drain(..).flatten().collect();
        self.live = 0;
        self.open.clear();
        self.queued_creates.clear();
        self.queued_destroys.clear();
        self.overflowing = false;
        self.destroy_since_compaction = false;
        batch
    }
}

fn merge_into(queued: &mut RawNotification, newer: RawNotification) {
    match (queued, newer) {
        (
            RawNotification::Changed { value, tag, .. },
            RawNotification::Changed { value: newer_value, tag: newer_tag, .. },
        ) => {
            value.merge(newer_value);
            *tag = newer_tag;
        }
        (queued, newer) => *queued = newer,
    }
}

#[derive(Debug)]
struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

/// Creates a connected sink/stream pair with the given soft capacity.
#[must_use]
pub fn channel(capacity: usize) -> (NotificationSink, NotificationStream) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(Queue::new(capacity.max(1))),
        notify: Notify::new(),
        closed: AtomicBool::new(false),
    });
    (NotificationSink { shared: Arc::clone(&shared) }, NotificationStream { shared })
}

/// Producer side, handed to the OS binding. Cheap to clone.
#[derive(Clone, Debug)]
pub struct NotificationSink {
    shared: Arc<Shared>,
}

impl NotificationSink {
    /// Queues a notification. Never blocks.
    ///
    /// Returns false if the session has closed.
    pub fn push(&self, notification: RawNotification) -> bool {
        if self.is_closed() {
            return false;
        }
        self.shared.queue.lock().push(notification);
        self.shared.notify.notify_one();
        true
    }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.shared.closed.load(Ordering::Acquire) }

    #[must_use]
    pub fn stats(&self) -> NormalizerStats { self.shared.queue.lock().stats }

    /// Number of queued notifications.
    #[must_use]
    pub fn len(&self) -> usize { self.shared.queue.lock().live }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Consumer side, owned by the reconciler.
#[derive(Debug)]
pub struct NotificationStream {
    shared: Arc<Shared>,
}

impl NotificationStream {
    /// Waits for queued notifications and takes all of them.
    ///
    /// Returns `None` once the stream is closed. Cancel-safe: nothing is taken
    /// unless the batch is returned.
    pub async fn next_batch(&mut self) -> Option<Vec<RawNotification>> {
        loop {
            if self.shared.closed.load(Ordering::Acquire) {
                return None;
            }
            let batch = self.try_next_batch();
            if !batch.is_empty() {
                return Some(batch);
            }
            self.shared.notify.notified().await;
        }
    }

    /// Takes everything queued right now.
    pub fn try_next_batch(&mut self) -> Vec<RawNotification> {
        let mut queue = self.shared.queue.lock();
        if queue.live == 0 {
            return Vec::new();
        }
        queue.drain()
    }

    /// Closes the stream; later pushes are refused.
    pub fn close(&self) { self.shared.close(); }
}

impl Drop for NotificationStream {
    fn drop(&mut self) { self.shared.close(); }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::events::{AttributeValue, CommandTag, ObjectInfo};
    use crate::reconciler::state::{Point, Rect};

    fn window_ref(n: u32) -> OsRef { OsRef::Window { pid: 1, window_number: n } }

    fn created(n: u32) -> RawNotification {
        RawNotification::Created {
            object: ObjectInfo::Window {
                pid: 1,
                window_number: n,
                title: String::new(),
                frame: Rect::new(0.0, 0.0, 100.0, 100.0),
                is_minimized: false,
                is_fullscreen: false,
            },
        }
    }

    fn moved(n: u32, x: f64, tag: Option<u64>) -> RawNotification {
        RawNotification::Changed {
            object: window_ref(n),
            value: AttributeValue::position(Point::new(x, 0.0)),
            tag: tag.map(CommandTag),
        }
    }

    fn title(n: u32, title: &str) -> RawNotification {
        RawNotification::Changed {
            object: window_ref(n),
            value: AttributeValue::Title(title.to_string()),
            tag: None,
        }
    }

    #[test]
    fn test_burst_coalesces_at_first_position() {
        let (sink, mut stream) = channel(64);
        sink.push(moved(1, 1.0, None));
        sink.push(title(2, "other"));
        sink.push(moved(1, 2.0, None));
        sink.push(moved(1, 3.0, Some(9)));

        let batch = stream.try_next_batch();
        assert_eq!(batch, vec![moved(1, 3.0, Some(9)), title(2, "other")]);
        assert_eq!(sink.stats().coalesced, 2);
    }

    #[test]
    fn test_latest_tag_wins_even_when_absent() {
        let (sink, mut stream) = channel(64);
        sink.push(moved(1, 1.0, Some(4)));
        sink.push(moved(1, 2.0, None));

        assert_eq!(stream.try_next_batch(), vec![moved(1, 2.0, None)]);
    }

    #[test]
    fn test_destroy_seals_coalescing() {
        let (sink, mut stream) = channel(64);
        sink.push(title(1, "before"));
        sink.push(RawNotification::Destroyed { object: window_ref(1) });
        sink.push(created(1));
        sink.push(title(1, "after"));

        let batch = stream.try_next_batch();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0], title(1, "before"));
        assert_eq!(batch[3], title(1, "after"));
    }

    #[test]
    fn test_duplicate_creation_is_dropped() {
        let (sink, mut stream) = channel(64);
        sink.push(created(1));
        sink.push(created(1));

        assert_eq!(stream.try_next_batch().len(), 1);
        assert_eq!(sink.stats().duplicates, 1);
    }

    #[test]
    fn test_will_change_does_not_merge_across_did_change() {
        let (sink, mut stream) = channel(64);
        sink.push(RawNotification::SpaceWillChange);
        sink.push(RawNotification::ActiveSpacesChanged { space_ids: vec![1] });
        sink.push(RawNotification::SpaceWillChange);

        assert_eq!(stream.try_next_batch().len(), 3);
    }

    #[test]
    fn test_overflow_compacts_but_keeps_structural_events() {
        let (sink, mut stream) = channel(4);
        for n in 0..4 {
            sink.push(created(n));
        }
        for n in 0..4 {
            sink.push(title(n, "changed"));
        }
        for n in 0..4 {
            sink.push(RawNotification::Destroyed { object: window_ref(n) });
        }

        let batch = stream.try_next_batch();
        assert_eq!(batch.iter().filter(|n| n.is_structural()).count(), 8);
        assert!(sink.stats().compacted > 0);
        assert!(batch.iter().all(RawNotification::is_structural));
    }

    fn frontmost(pid: i32) -> RawNotification {
        RawNotification::FrontmostChanged { pid: Some(pid), tag: None }
    }

    fn main_window(n: Option<u32>) -> RawNotification {
        RawNotification::Changed {
            object: OsRef::Application { pid: 1 },
            value: AttributeValue::MainWindow(n),
            tag: None,
        }
    }

    fn launched(pid: i32) -> RawNotification {
        RawNotification::Created {
            object: ObjectInfo::Application {
                pid,
                bundle_id: None,
                name: String::new(),
                is_hidden: false,
                is_frontmost: false,
            },
        }
    }

    #[test]
    fn test_app_creation_seals_frontmost() {
        let (sink, mut stream) = channel(64);
        sink.push(frontmost(7));
        sink.push(launched(500));
        sink.push(frontmost(500));

        assert_eq!(stream.try_next_batch(), vec![frontmost(7), launched(500), frontmost(500)]);
        assert_eq!(sink.stats().coalesced, 0);
    }

    #[test]
    fn test_window_creation_seals_owner_pointers() {
        let (sink, mut stream) = channel(64);
        sink.push(main_window(Some(1)));
        sink.push(created(3));
        sink.push(main_window(Some(3)));

        assert_eq!(
            stream.try_next_batch(),
            vec![main_window(Some(1)), created(3), main_window(Some(3))]
        );
    }

    #[test]
    fn test_unrelated_creation_keeps_coalescing() {
        let (sink, mut stream) = channel(64);
        sink.push(frontmost(7));
        sink.push(RawNotification::Created {
            object: ObjectInfo::Screen {
                display_id: 2,
                name: String::new(),
                frame: Rect::new(0.0, 0.0, 10.0, 10.0),
                is_main: false,
            },
        });
        sink.push(frontmost(8));

        let batch = stream.try_next_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], frontmost(8));
    }

    #[test]
    fn test_space_creation_seals_active_spaces() {
        let (sink, mut stream) = channel(64);
        sink.push(RawNotification::ActiveSpacesChanged { space_ids: vec![1] });
        sink.push(RawNotification::Created {
            object: ObjectInfo::Space { space_id: 9, display_id: 1, is_active: false },
        });
        sink.push(RawNotification::ActiveSpacesChanged { space_ids: vec![9] });

        assert_eq!(stream.try_next_batch().len(), 3);
    }

    #[test]
    fn test_overflow_without_destructions_skips_rescans() {
        let (sink, mut stream) = channel(2);
        for n in 0..8 {
            sink.push(title(n, "changed"));
        }
        assert_eq!(sink.stats().compaction_passes, 0);

        sink.push(RawNotification::Destroyed { object: window_ref(0) });
        assert_eq!(sink.stats().compaction_passes, 1);
        assert_eq!(sink.stats().compacted, 1);

        for n in 8..16 {
            sink.push(title(n, "changed"));
        }
        assert_eq!(sink.stats().compaction_passes, 1);
        assert_eq!(stream.try_next_batch().len(), 16);
    }

    #[test]
    fn test_drain_resets_coalescing() {
        let (sink, mut stream) = channel(64);
        sink.push(moved(1, 1.0, None));
        assert_eq!(stream.try_next_batch().len(), 1);

        sink.push(moved(1, 2.0, None));
        assert_eq!(stream.try_next_batch(), vec![moved(1, 2.0, None)]);
    }

    #[test]
    fn test_push_after_close_is_refused() {
        let (sink, stream) = channel(64);
        drop(stream);
        assert!(!sink.push(title(1, "late")));
    }

    #[tokio::test]
    async fn test_next_batch_wakes_on_push() {
        let (sink, mut stream) = channel(64);
        let producer = tokio::spawn(async move {
            sink.push(title(1, "hello"));
            sink
        });

        let batch = stream.next_batch().await.unwrap();
        assert_eq!(batch, vec![title(1, "hello")]);
        let _sink = producer.await.unwrap();
    }
}
