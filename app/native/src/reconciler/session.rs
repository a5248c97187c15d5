//! The public entry point.
//!
//! A [`Session`] owns one reconciler actor and everything hanging off it:
//! the snapshot reader, the event dispatcher, the command executor, and the
//! notification sink handed to the window-server binding. Nothing is global;
//! two sessions are fully independent.

use std::sync::Arc;

use eyeball::Subscriber;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::actor::core::ReconcilerCore;
use super::actor::{Reconciler, ReconcilerHandle};
use super::boundary::WindowServer;
use super::commands::{CommandExecutor, Confirmation, Mutation, PendingCommand};
use super::dispatch::{Event, EventDispatcher, EventKind, SubscriptionId};
use super::error::{CommandError, SessionError};
use super::events::{self, NotificationSink};
use super::state::{
    AppId, Application, EntityId, Point, Rect, Screen, ScreenId, Size, Snapshot, SnapshotReader,
    Space, Window, WindowId,
};
use crate::config::ReconcilerConfig;

/// A live view of the desktop plus the means to change it.
pub struct Session {
    id: Uuid,
    config: ReconcilerConfig,
    handle: ReconcilerHandle,
    reader: SnapshotReader,
    dispatcher: EventDispatcher,
    executor: CommandExecutor,
    sink: NotificationSink,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("version", &self.reader.get().version())
            .field("subscribers", &self.dispatcher.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl Session {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Creates a session on the current tokio runtime.
    ///
    /// Discovery runs synchronously; the initial world is in the snapshot
    /// when this returns, and no events are emitted for it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoRuntime`] outside a runtime,
    /// [`SessionError::Config`] for invalid settings, or
    /// [`SessionError::Discovery`] if the window server cannot be queried.
    pub fn create(server: Arc<dyn WindowServer>, config: ReconcilerConfig) -> Result<Self, SessionError> {
        let runtime = Handle::try_current()?;
        config.validate().map_err(|err| SessionError::Config(err.to_string()))?;

        let id = Uuid::now_v7();
        let (sink, stream) = events::channel(config.notification_queue_capacity);

        // Attach before discovery so changes made while enumerating are queued.
        server.attach(sink.clone());
        let world = server.discover()?;

        let mut core = ReconcilerCore::new(&config);
        core.seed(world);
        let reader = core.store.reader();

        let dispatcher = EventDispatcher::new(runtime.clone(), config.subscriber_queue_capacity);
        let (actor, handle) =
            Reconciler::new(core, stream, dispatcher.clone(), config.control_channel_capacity);
        let task = actor.spawn(&runtime);
        let executor = CommandExecutor::new(handle.clone(), server);

        tracing::info!(
            session = %id,
            windows = reader.get().windows().len(),
            applications = reader.get().applications().len(),
            "reconciler: session created"
        );

        Ok(Self { id, config, handle, reader, dispatcher, executor, sink, task })
    }

    /// Creates a session and waits until the actor is running.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::create`], or [`SessionError::Closed`] if the
    /// actor stopped before answering.
    pub async fn initialize(
        server: Arc<dyn WindowServer>,
        config: ReconcilerConfig,
    ) -> Result<Self, SessionError> {
        let session = Self::create(server, config)?;
        session.flush().await?;
        Ok(session)
    }

    /// Creates a session in the background and hands the result to `callback`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoRuntime`] outside a tokio runtime.
    pub fn create_async<F>(
        server: Arc<dyn WindowServer>,
        config: ReconcilerConfig,
        callback: F,
    ) -> Result<JoinHandle<()>, SessionError>
    where
        F: FnOnce(Result<Self, SessionError>) + Send + 'static,
    {
        let runtime = Handle::try_current()?;
        Ok(runtime.spawn(async move { callback(Self::initialize(server, config).await) }))
    }

    /// Stops the session.
    ///
    /// Pending commands resolve with `SessionClosed`, undelivered events are
    /// discarded, and every subscriber task has finished when this returns.
    /// Must not be awaited from inside an event handler.
    pub async fn destroy(self) {
        tracing::debug!(session = %self.id, "reconciler: destroying session");
        if let Err(err) = self.handle.shutdown().await {
            tracing::debug!("reconciler: actor already stopped: {err}");
            self.dispatcher.shutdown().await;
        }
        if let Err(err) = self.task.await {
            tracing::warn!("reconciler: actor task ended abnormally: {err}");
        }
    }

    /// Waits until every notification pushed so far has been processed and
    /// published. Returns the published snapshot version.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the actor has stopped.
    pub async fn flush(&self) -> Result<u64, SessionError> {
        self.handle.flush().await.map_err(|_| SessionError::Closed)
    }

    /// Flushes, then waits until every subscriber has handled every event.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the actor has stopped.
    pub async fn settle(&self) -> Result<u64, SessionError> {
        let version = self.flush().await?;
        self.dispatcher.quiesce().await;
        Ok(version)
    }

    #[must_use]
    pub const fn id(&self) -> Uuid { self.id }

    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig { &self.config }

    /// The queue the window-server binding pushes notifications into.
    #[must_use]
    pub fn sink(&self) -> NotificationSink { self.sink.clone() }

    #[must_use]
    pub fn is_alive(&self) -> bool { self.handle.is_alive() }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The last published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> { self.reader.get() }

    /// Observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> Subscriber<Arc<Snapshot>> { self.reader.subscribe() }

    /// A cloneable read handle that outlives borrows of the session.
    #[must_use]
    pub fn reader(&self) -> SnapshotReader { self.reader.clone() }

    #[must_use]
    pub fn screens(&self) -> Vec<Screen> { self.snapshot().screens().to_vec() }

    #[must_use]
    pub fn main_screen(&self) -> Option<Screen> { self.snapshot().main_screen().cloned() }

    #[must_use]
    pub fn spaces(&self) -> Vec<Space> { self.snapshot().spaces().to_vec() }

    #[must_use]
    pub fn applications(&self) -> Vec<Application> { self.snapshot().applications().to_vec() }

    #[must_use]
    pub fn windows(&self) -> Vec<Window> { self.snapshot().windows().to_vec() }

    #[must_use]
    pub fn frontmost_application(&self) -> Option<Application> {
        self.snapshot().frontmost_application().cloned()
    }

    #[must_use]
    pub fn screen(&self, id: ScreenId) -> Option<Screen> { self.snapshot().screen(id).cloned() }

    #[must_use]
    pub fn application(&self, id: AppId) -> Option<Application> {
        self.snapshot().application(id).cloned()
    }

    #[must_use]
    pub fn window(&self, id: WindowId) -> Option<Window> { self.snapshot().window(id).cloned() }

    #[must_use]
    pub fn windows_for(&self, app: AppId) -> Vec<Window> {
        self.snapshot().windows_for(app).into_iter().cloned().collect()
    }

    #[must_use]
    pub fn window_screen(&self, id: WindowId) -> Option<Screen> {
        self.snapshot().window_screen(id).cloned()
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// The executor, for callers that submit from other tasks.
    #[must_use]
    pub fn executor(&self) -> CommandExecutor { self.executor.clone() }

    /// Submits a mutation without waiting for its confirmation.
    ///
    /// # Errors
    ///
    /// See [`CommandExecutor::submit`].
    pub async fn submit(
        &self,
        target: impl Into<EntityId>,
        mutation: Mutation,
    ) -> Result<PendingCommand, CommandError> {
        self.executor.submit(target, mutation).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_frame(&self, window: WindowId, frame: Rect) -> Result<Confirmation, CommandError> {
        self.executor.execute(window, Mutation::SetFrame(frame)).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_position(&self, window: WindowId, origin: Point) -> Result<Confirmation, CommandError> {
        self.executor.execute(window, Mutation::SetPosition(origin)).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_size(&self, window: WindowId, size: Size) -> Result<Confirmation, CommandError> {
        self.executor.execute(window, Mutation::SetSize(size)).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_minimized(&self, window: WindowId, minimized: bool) -> Result<Confirmation, CommandError> {
        self.executor.execute(window, Mutation::SetMinimized(minimized)).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_fullscreen(&self, window: WindowId, fullscreen: bool) -> Result<Confirmation, CommandError> {
        self.executor.execute(window, Mutation::SetFullscreen(fullscreen)).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_hidden(&self, app: AppId, hidden: bool) -> Result<Confirmation, CommandError> {
        self.executor.execute(app, Mutation::SetHidden(hidden)).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_main_window(&self, app: AppId, window: WindowId) -> Result<Confirmation, CommandError> {
        self.executor.execute(app, Mutation::SetMainWindow(window)).await
    }

    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn set_frontmost(&self, app: AppId) -> Result<Confirmation, CommandError> {
        self.executor.execute(app, Mutation::SetFrontmost).await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Calls `handler` for every event of `kind`, on its own task.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(kind, handler)
    }

    /// Calls `handler` for every event, on its own task.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe_all(handler)
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool { self.dispatcher.unsubscribe(id) }
}
