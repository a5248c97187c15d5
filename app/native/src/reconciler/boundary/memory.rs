//! In-memory window server used by the replay command and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::{MutationRequest, Operation, WindowServer};
use crate::reconciler::error::BoundaryError;
use crate::reconciler::events::{AttributeValue, NotificationSink, ObjectInfo, RawNotification};
use crate::reconciler::registry::OsRef;

/// A scriptable [`WindowServer`].
///
/// Requests are recorded. When echo is enabled (the default) every accepted
/// request is answered with the tagged notification a real binding would
/// produce, pushed through the attached sink.
#[derive(Debug)]
pub struct InMemoryWindowServer {
    world: Mutex<Vec<ObjectInfo>>,
    sink: Mutex<Option<NotificationSink>>,
    echo: AtomicBool,
    available: AtomicBool,
    reject_next: Mutex<Option<BoundaryError>>,
    requests: Mutex<Vec<MutationRequest>>,
}

impl InMemoryWindowServer {
    /// Creates a server whose discovery returns `world`.
    #[must_use]
    pub fn new(world: Vec<ObjectInfo>) -> Self {
        Self {
            world: Mutex::new(world),
            sink: Mutex::new(None),
            echo: AtomicBool::new(true),
            available: AtomicBool::new(true),
            reject_next: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Enables or disables automatic confirmations.
    pub fn set_echo(&self, echo: bool) { self.echo.store(echo, Ordering::Relaxed); }

    /// Makes discovery fail with `Unavailable` while false.
    pub fn set_available(&self, available: bool) { self.available.store(available, Ordering::Relaxed); }

    /// Rejects the next request with `error`.
    pub fn reject_next(&self, error: BoundaryError) { *self.reject_next.lock() = Some(error); }

    /// Adds an object to what discovery returns.
    pub fn seed(&self, object: ObjectInfo) { self.world.lock().push(object); }

    /// Every request performed so far.
    #[must_use]
    pub fn requests(&self) -> Vec<MutationRequest> { self.requests.lock().clone() }

    /// Pushes a notification as if the OS had sent it.
    ///
    /// Returns false if no session is attached or it has closed.
    pub fn notify(&self, notification: RawNotification) -> bool {
        self.sink.lock().as_ref().is_some_and(|sink| sink.push(notification))
    }

    fn echo_for(request: &MutationRequest) -> Option<RawNotification> {
        let tag = Some(request.tag);
        let object = request.target;
        let changed = |value| RawNotification::Changed { object, value, tag };

        let notification = match (&request.operation, object) {
            (Operation::SetFrame(frame), _) => changed(AttributeValue::frame(*frame)),
            (Operation::SetPosition(origin), _) => changed(AttributeValue::position(*origin)),
            (Operation::SetSize(size), _) => changed(AttributeValue::size(*size)),
            (Operation::SetMinimized(flag), _) => changed(AttributeValue::Minimized(*flag)),
            (Operation::SetFullscreen(flag), _) => changed(AttributeValue::Fullscreen(*flag)),
            (Operation::SetHidden(flag), _) => changed(AttributeValue::Hidden(*flag)),
            (Operation::SetMainWindow { window_number }, _) => {
                changed(AttributeValue::MainWindow(Some(*window_number)))
            }
            (Operation::SetFrontmost, OsRef::Application { pid }) => {
                RawNotification::FrontmostChanged { pid: Some(pid), tag }
            }
            (Operation::SetFrontmost, _) => return None,
        };
        Some(notification)
    }
}

impl Default for InMemoryWindowServer {
    fn default() -> Self { Self::new(Vec::new()) }
}

impl WindowServer for InMemoryWindowServer {
    fn attach(&self, sink: NotificationSink) { *self.sink.lock() = Some(sink); }

    fn discover(&self) -> Result<Vec<ObjectInfo>, BoundaryError> {
        if !self.available.load(Ordering::Relaxed) {
            return Err(BoundaryError::Unavailable("window server not reachable".to_string()));
        }
        Ok(self.world.lock().clone())
    }

    fn perform(&self, request: &MutationRequest) -> Result<(), BoundaryError> {
        self.requests.lock().push(request.clone());

        if let Some(error) = self.reject_next.lock().take() {
            tracing::debug!("reconciler: in-memory server rejecting {}", request.tag);
            return Err(error);
        }

        if self.echo.load(Ordering::Relaxed)
            && let Some(notification) = Self::echo_for(request)
        {
            self.notify(notification);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciler::events::{CommandTag, channel};
    use crate::reconciler::state::Rect;

    fn request(operation: Operation, target: OsRef) -> MutationRequest {
        MutationRequest { tag: CommandTag(3), target, operation }
    }

    #[test]
    fn test_echo_carries_tag() {
        let server = InMemoryWindowServer::default();
        let (sink, mut stream) = channel(16);
        server.attach(sink);

        let target = OsRef::Window { pid: 1, window_number: 2 };
        let frame = Rect::new(0.0, 0.0, 800.0, 600.0);
        server.perform(&request(Operation::SetFrame(frame), target)).unwrap();

        assert_eq!(
            stream.try_next_batch(),
            vec![RawNotification::Changed {
                object: target,
                value: AttributeValue::frame(frame),
                tag: Some(CommandTag(3)),
            }]
        );
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn test_reject_next_only_once() {
        let server = InMemoryWindowServer::default();
        server.reject_next(BoundaryError::Rejected { code: -25204, message: "denied".into() });

        let target = OsRef::Application { pid: 1 };
        assert!(server.perform(&request(Operation::SetHidden(true), target)).is_err());
        assert!(server.perform(&request(Operation::SetHidden(true), target)).is_ok());
    }

    #[test]
    fn test_silent_server_records_without_echo() {
        let server = InMemoryWindowServer::default();
        let (sink, mut stream) = channel(16);
        server.attach(sink);
        server.set_echo(false);

        let target = OsRef::Application { pid: 1 };
        server.perform(&request(Operation::SetFrontmost, target)).unwrap();

        assert!(stream.try_next_batch().is_empty());
        assert_eq!(server.requests().len(), 1);
    }

    #[test]
    fn test_unavailable_discovery_fails() {
        let server = InMemoryWindowServer::default();
        server.set_available(false);
        assert!(matches!(server.discover(), Err(BoundaryError::Unavailable(_))));
    }
}
