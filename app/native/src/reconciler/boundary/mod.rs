//! Outbound boundary to the window server.
//!
//! The reconciler never talks to the OS directly. A [`WindowServer`]
//! implementation discovers the initial world and performs mutations; the
//! notifications those mutations cause come back through the session's
//! [`NotificationSink`](crate::reconciler::events::NotificationSink), echoing
//! the request's [`CommandTag`] where the binding can attribute them.

mod memory;

pub use memory::InMemoryWindowServer;
use serde::{Deserialize, Serialize};

use super::error::BoundaryError;
use super::events::{CommandTag, NotificationSink, ObjectInfo};
use super::registry::OsRef;
use super::state::{Point, Rect, Size};

/// An OS-level mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    SetFrame(Rect),
    SetPosition(Point),
    SetSize(Size),
    SetMinimized(bool),
    SetFullscreen(bool),
    SetHidden(bool),
    SetMainWindow { window_number: u32 },
    SetFrontmost,
}

/// A mutation addressed to an OS object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRequest {
    /// Tag to echo on the notifications this request causes.
    pub tag: CommandTag,
    pub target: OsRef,
    pub operation: Operation,
}

/// The window-server binding.
pub trait WindowServer: Send + Sync + 'static {
    /// Connects the binding to the session's notification queue.
    ///
    /// Called once, before discovery, so nothing that changes while the
    /// world is enumerated is lost.
    fn attach(&self, sink: NotificationSink);

    /// Enumerates the current screens, spaces, applications and windows.
    ///
    /// # Errors
    ///
    /// Returns a [`BoundaryError`] if the window server cannot be queried.
    fn discover(&self) -> Result<Vec<ObjectInfo>, BoundaryError>;

    /// Performs a mutation. Success means the request was accepted, not that
    /// the state changed.
    ///
    /// # Errors
    ///
    /// Returns a [`BoundaryError`] if the OS rejects the request synchronously.
    fn perform(&self, request: &MutationRequest) -> Result<(), BoundaryError>;
}
