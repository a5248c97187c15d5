//! Event dispatcher with per-subscriber mailboxes.
//!
//! Each subscriber owns a mailbox and a tokio task that drains it. Delivery is:
//! - in production order per subscriber
//! - exactly once per event to every subscriber registered when it is dispatched
//! - isolated: a panicking handler is logged and the next event is delivered
//!
//! The producer never blocks. Mailbox capacity is a lag threshold: exceeding it
//! logs a warning but nothing is dropped.

mod event;

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
pub use event::{Event, EventKind};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use super::panic_message;

/// Identifies a subscription for [`EventDispatcher::unsubscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(u64);

/// A subscriber callback.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

struct Mailbox {
    queue: Mutex<VecDeque<Arc<Event>>>,
    notify: Notify,
    closed: AtomicBool,
    lagging: AtomicBool,
    /// Queued plus in-flight events.
    pending: watch::Sender<usize>,
    capacity: usize,
}

impl Mailbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            lagging: AtomicBool::new(false),
            pending: watch::Sender::new(0),
            capacity,
        }
    }

    fn push(&self, id: SubscriptionId, event: Arc<Event>) {
        if self.is_closed() {
            return;
        }

        self.pending.send_modify(|n| *n += 1);
        let len = {
            let mut queue = self.queue.lock();
            queue.push_back(event);
            queue.len()
        };

        if len > self.capacity {
            if !self.lagging.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "reconciler: subscriber {id:?} is lagging ({len} events queued, threshold {})",
                    self.capacity
                );
            }
        } else {
            self.lagging.store(false, Ordering::Relaxed);
        }

        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Arc<Event>> { self.queue.lock().pop_front() }

    fn done(&self) { self.pending.send_modify(|n| *n = n.saturating_sub(1)); }

    fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    /// Closes the mailbox and discards undelivered events.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let discarded = self.queue.lock().drain(..).count();
        if discarded > 0 {
            self.pending.send_modify(|n| *n = n.saturating_sub(discarded));
        }
        self.notify.notify_one();
    }
}

struct Subscription {
    filter: Option<EventKind>,
    mailbox: Arc<Mailbox>,
    task: JoinHandle<()>,
}

struct Inner {
    subscriptions: DashMap<SubscriptionId, Subscription>,
    next_id: AtomicU64,
    capacity: usize,
    runtime: Handle,
    closed: AtomicBool,
}

/// Fans events out to subscribers. Cheap to clone.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    /// Creates a dispatcher spawning subscriber tasks on `runtime`.
    #[must_use]
    pub fn new(runtime: Handle, capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscriptions: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                runtime,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribes `handler` to one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Subscribes `handler` to every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, filter: Option<EventKind>, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        if self.inner.closed.load(Ordering::Acquire) {
            tracing::debug!("reconciler: ignoring subscription {id:?} on a closed dispatcher");
            return id;
        }

        let mailbox = Arc::new(Mailbox::new(self.inner.capacity));
        let task = self.inner.runtime.spawn(deliver(id, Arc::clone(&mailbox), handler));
        self.inner.subscriptions.insert(id, Subscription { filter, mailbox, task });

        tracing::debug!("reconciler: subscriber {id:?} registered (filter={filter:?})");
        id
    }

    /// Removes a subscription. Undelivered events are discarded.
    ///
    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Some((_, subscription)) = self.inner.subscriptions.remove(&id) else {
            return false;
        };
        subscription.mailbox.close();
        tracing::debug!("reconciler: subscriber {id:?} removed");
        true
    }

    /// Queues `event` for every matching subscriber.
    pub fn dispatch(&self, event: Event) {
        let kind = event.kind();
        let event = Arc::new(event);
        for entry in &self.inner.subscriptions {
            if entry.filter.is_none_or(|filter| filter == kind) {
                entry.mailbox.push(*entry.key(), Arc::clone(&event));
            }
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize { self.inner.subscriptions.len() }

    /// Waits until every mailbox is empty and no handler is running.
    pub async fn quiesce(&self) {
        let receivers: Vec<watch::Receiver<usize>> = self
            .inner
            .subscriptions
            .iter()
            .map(|entry| entry.mailbox.pending.subscribe())
            .collect();

        for mut receiver in receivers {
            // The sender lives as long as the mailbox; an error means it is gone.
            let _ = receiver.wait_for(|pending| *pending == 0).await;
        }
    }

    /// Closes every mailbox without waiting for the tasks.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for entry in &self.inner.subscriptions {
            entry.mailbox.close();
        }
    }

    /// Closes every mailbox and waits for all subscriber tasks to finish.
    ///
    /// Must not be awaited from inside a handler.
    pub async fn shutdown(&self) {
        self.close();

        let ids: Vec<SubscriptionId> =
            self.inner.subscriptions.iter().map(|entry| *entry.key()).collect();
        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, subscription)) = self.inner.subscriptions.remove(&id) {
                subscription.mailbox.close();
                tasks.push(subscription.task);
            }
        }

        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!("reconciler: subscriber task ended abnormally: {err}");
            }
        }
    }
}

async fn deliver(id: SubscriptionId, mailbox: Arc<Mailbox>, handler: EventHandler) {
    loop {
        if mailbox.is_closed() {
            break;
        }
        let Some(event) = mailbox.pop() else {
            mailbox.notify.notified().await;
            continue;
        };

        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event.as_ref()))) {
            tracing::error!(
                "reconciler: subscriber {id:?} panicked handling {}: {}",
                event.kind(),
                panic_message(panic.as_ref())
            );
        }
        mailbox.done();
    }
    tracing::trace!("reconciler: subscriber {id:?} task exiting");
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::mpsc;

    use super::*;

    fn will_change() -> Event { Event::SpaceWillChange { external: true, space_ids: Vec::new() } }

    fn did_change() -> Event { Event::SpaceDidChange { external: true, space_ids: Vec::new() } }

    #[tokio::test]
    async fn test_delivers_in_order_to_every_subscriber() {
        let dispatcher = EventDispatcher::new(Handle::current(), 16);
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        dispatcher.subscribe_all(move |e| {
            let _ = tx_a.send(e.kind());
        });
        dispatcher.subscribe_all(move |e| {
            let _ = tx_b.send(e.kind());
        });

        dispatcher.dispatch(will_change());
        dispatcher.dispatch(did_change());
        dispatcher.quiesce().await;

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.recv().await, Some(EventKind::SpaceWillChange));
            assert_eq!(rx.recv().await, Some(EventKind::SpaceDidChange));
        }
    }

    #[tokio::test]
    async fn test_kind_filter() {
        let dispatcher = EventDispatcher::new(Handle::current(), 16);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        dispatcher.subscribe(EventKind::SpaceDidChange, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(will_change());
        dispatcher.dispatch(did_change());
        dispatcher.quiesce().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_subscriber_is_isolated() {
        let dispatcher = EventDispatcher::new(Handle::current(), 16);
        let count = Arc::new(AtomicUsize::new(0));
        let panicking = Arc::new(AtomicUsize::new(0));

        let calls = Arc::clone(&panicking);
        dispatcher.subscribe_all(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            panic!("handler failure");
        });
        let seen = Arc::clone(&count);
        dispatcher.subscribe_all(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(will_change());
        dispatcher.dispatch(did_change());
        dispatcher.quiesce().await;

        assert_eq!(panicking.load(Ordering::SeqCst), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let dispatcher = EventDispatcher::new(Handle::current(), 16);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let id = dispatcher.subscribe_all(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.dispatch(will_change());
        dispatcher.quiesce().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_never_drops() {
        let dispatcher = EventDispatcher::new(Handle::current(), 2);
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        dispatcher.subscribe_all(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..10 {
            dispatcher.dispatch(will_change());
        }
        dispatcher.quiesce().await;

        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_shutdown_joins_tasks() {
        let dispatcher = EventDispatcher::new(Handle::current(), 16);
        dispatcher.subscribe_all(|_| {});
        dispatcher.shutdown().await;

        assert_eq!(dispatcher.subscriber_count(), 0);
        dispatcher.subscribe_all(|_| {});
        assert_eq!(dispatcher.subscriber_count(), 0);
    }
}
