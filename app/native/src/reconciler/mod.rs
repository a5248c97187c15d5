//! Live window-management state reconciler.
//!
//! # Architecture
//!
//! ```text
//!   OS binding ──push──► NotificationSink ─┐  (coalescing queue)
//!                                          ▼
//!   Session ──commands──► Reconciler actor ──publish──► SnapshotReader
//!      │                  │   registry      │
//!      │                  │   store         └──dispatch──► subscribers
//!      │                  │   pending slots
//!      └──perform(tag)──► WindowServer
//! ```
//!
//! The reconciler actor is the single writer. Readers see the last published
//! `Arc<Snapshot>` and never block it. Commands install a pending slot on
//! the actor before the window server is asked to perform them, so the
//! notification caused by a command is attributed to it (`external = false`)
//! and resolves its future.
//!
//! # Modules
//!
//! - `registry`: OS references to generational entity ids
//! - `state`: entity records, snapshot, deltas, and the snapshot store
//! - `events`: raw notifications and the coalescing normalizer
//! - `actor`: the reconciler task, handlers, and pending slots
//! - `commands`: mutations and the command executor
//! - `dispatch`: events and per-subscriber delivery
//! - `boundary`: the window-server trait and an in-memory implementation
//! - `session`: the public entry point tying everything together

pub mod actor;
pub mod boundary;
pub mod commands;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod registry;
pub mod session;
pub mod state;

use std::any::Any;

pub use actor::{ActorError, ReconcilerHandle};
pub use boundary::{InMemoryWindowServer, MutationRequest, Operation, WindowServer};
pub use commands::{CommandExecutor, Confirmation, Mutation, PendingCommand};
pub use dispatch::{Event, EventDispatcher, EventKind, SubscriptionId};
pub use error::{BoundaryError, CommandError, RegistryError, SessionError};
pub use events::{AttributeValue, CommandTag, NotificationSink, ObjectInfo, RawNotification};
pub use registry::OsRef;
pub use session::Session;
pub use state::{
    AppId, Application, EntityId, EntityKind, Point, Rect, Screen, ScreenId, Size, Snapshot,
    SnapshotReader, Space, SpaceId, Window, WindowId,
};

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
