//! Session scenarios driven through the in-memory window server.
//!
//! Every test runs on a paused tokio clock, so command timeouts elapse
//! instantly once the runtime is idle.
//!
//! ```bash
//! cargo test -p winsync --test session_scenarios
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use winsync_lib::config::ReconcilerConfig;
use winsync_lib::reconciler::{
    AppId, AttributeValue, CommandError, Event, EventKind, InMemoryWindowServer, Mutation,
    ObjectInfo, OsRef, Point, RawNotification, Rect, Session, WindowId, WindowServer,
};

// ============================================================================
// Fixture
// ============================================================================

const MAIL: i32 = 42;
const NOTES: i32 = 77;

fn main_frame() -> Rect { Rect::new(0.0, 0.0, 1920.0, 1080.0) }

fn side_frame() -> Rect { Rect::new(1920.0, 0.0, 1280.0, 1024.0) }

fn world() -> Vec<ObjectInfo> {
    vec![
        ObjectInfo::Screen { display_id: 1, name: "Built-in".into(), frame: main_frame(), is_main: true },
        ObjectInfo::Screen { display_id: 2, name: "Side".into(), frame: side_frame(), is_main: false },
        ObjectInfo::Space { space_id: 10, display_id: 1, is_active: true },
        ObjectInfo::Space { space_id: 11, display_id: 1, is_active: false },
        ObjectInfo::Space { space_id: 20, display_id: 2, is_active: true },
        ObjectInfo::Application {
            pid: MAIL,
            bundle_id: Some("com.example.mail".into()),
            name: "Mail".into(),
            is_hidden: false,
            is_frontmost: true,
        },
        ObjectInfo::Application {
            pid: NOTES,
            bundle_id: Some("com.example.notes".into()),
            name: "Notes".into(),
            is_hidden: false,
            is_frontmost: false,
        },
        ObjectInfo::Window {
            pid: MAIL,
            window_number: 1,
            title: "Inbox".into(),
            frame: Rect::new(100.0, 100.0, 800.0, 600.0),
            is_minimized: false,
            is_fullscreen: false,
        },
        ObjectInfo::Window {
            pid: MAIL,
            window_number: 2,
            title: "Compose".into(),
            frame: Rect::new(200.0, 200.0, 400.0, 300.0),
            is_minimized: false,
            is_fullscreen: false,
        },
    ]
}

struct Fixture {
    server: Arc<InMemoryWindowServer>,
    session: Session,
    events: Arc<Mutex<Vec<Event>>>,
}

impl Fixture {
    async fn new() -> Self { Self::with_config(ReconcilerConfig::default()).await }

    async fn with_config(config: ReconcilerConfig) -> Self {
        let server = Arc::new(InMemoryWindowServer::new(world()));
        let session = Session::initialize(Arc::clone(&server) as Arc<dyn WindowServer>, config)
            .await
            .expect("session");

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&events);
        session.subscribe_all(move |event| recorded.lock().push(event.clone()));

        Self { server, session, events }
    }

    fn window(&self, window_number: u32) -> WindowId {
        let entity = self
            .session
            .snapshot()
            .resolve_os_ref(&OsRef::Window { pid: MAIL, window_number })
            .expect("window is known");
        WindowId::from_entity(entity).expect("window id")
    }

    fn app(&self, pid: i32) -> AppId {
        self.session.snapshot().application_by_pid(pid).expect("app is known").id
    }

    fn notify(&self, notification: RawNotification) { assert!(self.server.notify(notification)); }

    fn change_window(&self, window_number: u32, value: AttributeValue) {
        self.notify(RawNotification::Changed {
            object: OsRef::Window { pid: MAIL, window_number },
            value,
            tag: None,
        });
    }

    async fn settle(&self) -> u64 { self.session.settle().await.expect("settle") }

    fn take_events(&self) -> Vec<Event> { std::mem::take(&mut *self.events.lock()) }

    fn kinds(&self) -> Vec<EventKind> { self.take_events().iter().map(Event::kind).collect() }
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_discovery_is_silent_and_queryable() {
    let fx = Fixture::new().await;
    fx.settle().await;

    assert!(fx.take_events().is_empty());
    assert_eq!(fx.session.screens().len(), 2);
    assert_eq!(fx.session.main_screen().map(|s| s.display_id), Some(1));
    assert_eq!(fx.session.spaces().len(), 3);
    assert_eq!(fx.session.frontmost_application().map(|a| a.pid), Some(MAIL));
    assert_eq!(fx.session.windows_for(fx.app(MAIL)).len(), 2);
    assert_eq!(fx.session.window_screen(fx.window(1)).map(|s| s.display_id), Some(1));
}

// ============================================================================
// Coalescing and idempotence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_drag_burst_coalesces_to_one_event() {
    let fx = Fixture::new().await;
    let before = fx.settle().await;

    for step in 1..=10 {
        let offset = f64::from(step) * 10.0 + 5.0;
        fx.change_window(1, AttributeValue::position(Point::new(offset, offset)));
    }
    let after = fx.settle().await;

    let events = fx.take_events();
    assert_eq!(events.len(), 1);
    let Event::WindowResized { external, old, new, .. } = &events[0] else {
        panic!("expected WindowResized, got {:?}", events[0]);
    };
    assert!(*external);
    assert_eq!(*old, Rect::new(100.0, 100.0, 800.0, 600.0));
    assert_eq!(*new, Rect::new(105.0, 105.0, 800.0, 600.0));
    assert_eq!(after, before + 1);
}

#[tokio::test(start_paused = true)]
async fn test_same_value_emits_nothing_and_keeps_version() {
    let fx = Fixture::new().await;
    let before = fx.settle().await;

    fx.change_window(1, AttributeValue::Title("Inbox".into()));
    fx.change_window(1, AttributeValue::frame(Rect::new(100.2, 100.0, 800.0, 600.0)));
    let after = fx.settle().await;

    assert!(fx.take_events().is_empty());
    assert_eq!(after, before);
}

#[tokio::test(start_paused = true)]
async fn test_old_snapshot_is_unchanged_after_update() {
    let fx = Fixture::new().await;
    let old = fx.session.snapshot();

    fx.change_window(1, AttributeValue::Title("Archive".into()));
    fx.settle().await;

    let window = fx.window(1);
    assert_eq!(old.window(window).map(|w| w.title.as_str()), Some("Inbox"));
    assert_eq!(fx.session.window(window).map(|w| w.title), Some("Archive".to_string()));
    assert!(fx.session.snapshot().version() > old.version());
}

#[tokio::test(start_paused = true)]
async fn test_watch_observes_publication() {
    let fx = Fixture::new().await;
    let mut watch = fx.session.watch();

    fx.change_window(2, AttributeValue::Minimized(true));
    let published = watch.next().await.expect("a new snapshot");

    assert!(published.window(fx.window(2)).is_some_and(|w| w.is_minimized));
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_command_and_concurrent_external_change() {
    let fx = Fixture::new().await;
    let window = fx.window(1);
    let frame = Rect::new(0.0, 0.0, 1024.0, 768.0);

    let pending = fx.session.submit(window, Mutation::SetFrame(frame)).await.expect("submitted");
    fx.change_window(1, AttributeValue::Title("Re: hello".into()));

    let confirmation = pending.await.expect("confirmed");
    fx.settle().await;

    assert_eq!(confirmation.value, winsync_lib::reconciler::state::Value::Frame(frame));
    let events = fx.take_events();
    assert_eq!(events.len(), 2);
    for event in &events {
        match event {
            Event::WindowResized { external, old, new, .. } => {
                assert!(!external);
                assert_eq!(*old, Rect::new(100.0, 100.0, 800.0, 600.0));
                assert_eq!(*new, frame);
            }
            Event::WindowTitleChanged { external, .. } => assert!(*external),
            other => panic!("unexpected {}", other.kind()),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_launch_then_set_frame_emits_one_internal_resize() {
    let fx = Fixture::new().await;
    let created_frame = Rect::new(40.0, 40.0, 500.0, 400.0);

    fx.notify(RawNotification::Created {
        object: ObjectInfo::Application {
            pid: 500,
            bundle_id: Some("com.example.app".into()),
            name: "App".into(),
            is_hidden: false,
            is_frontmost: false,
        },
    });
    fx.notify(RawNotification::Created {
        object: ObjectInfo::Window {
            pid: 500,
            window_number: 1,
            title: "Untitled".into(),
            frame: created_frame,
            is_minimized: false,
            is_fullscreen: false,
        },
    });
    fx.settle().await;

    let events = fx.take_events();
    assert_eq!(events.len(), 2);
    let Event::ApplicationLaunched { external, application } = &events[0] else {
        panic!("expected ApplicationLaunched, got {:?}", events[0]);
    };
    assert!(*external);
    assert_eq!(application.bundle_id.as_deref(), Some("com.example.app"));
    let Event::WindowCreated { window, .. } = &events[1] else {
        panic!("expected WindowCreated, got {:?}", events[1]);
    };
    assert_eq!(window.title, "Untitled");
    assert_eq!(window.app, application.id);

    let frame = Rect::new(0.0, 0.0, 1024.0, 768.0);
    let confirmation = fx.session.set_frame(window.id, frame).await.expect("confirmed");
    fx.settle().await;

    assert_eq!(confirmation.value, winsync_lib::reconciler::state::Value::Frame(frame));
    let events = fx.take_events();
    assert_eq!(events.len(), 1);
    let Event::WindowResized { external, old, new, .. } = &events[0] else {
        panic!("expected WindowResized, got {:?}", events[0]);
    };
    assert!(!external);
    assert_eq!(*old, created_frame);
    assert_eq!(*new, frame);
}

#[tokio::test(start_paused = true)]
async fn test_frontmost_switch_to_new_app_is_kept() {
    let fx = Fixture::new().await;

    fx.notify(RawNotification::FrontmostChanged { pid: Some(NOTES), tag: None });
    fx.notify(RawNotification::Created {
        object: ObjectInfo::Application {
            pid: 500,
            bundle_id: Some("com.example.app".into()),
            name: "App".into(),
            is_hidden: false,
            is_frontmost: false,
        },
    });
    fx.notify(RawNotification::FrontmostChanged { pid: Some(500), tag: None });
    fx.settle().await;

    assert_eq!(fx.session.frontmost_application().map(|a| a.pid), Some(500));
    assert_eq!(
        fx.kinds(),
        vec![
            EventKind::FrontmostApplicationChanged,
            EventKind::ApplicationLaunched,
            EventKind::FrontmostApplicationChanged,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_main_window_pointing_at_new_window_is_kept() {
    let fx = Fixture::new().await;
    let main_window = |number| RawNotification::Changed {
        object: OsRef::Application { pid: MAIL },
        value: AttributeValue::MainWindow(Some(number)),
        tag: None,
    };

    fx.notify(main_window(1));
    fx.notify(RawNotification::Created {
        object: ObjectInfo::Window {
            pid: MAIL,
            window_number: 3,
            title: "Draft".into(),
            frame: Rect::new(300.0, 300.0, 400.0, 300.0),
            is_minimized: false,
            is_fullscreen: false,
        },
    });
    fx.notify(main_window(3));
    fx.settle().await;

    let main = fx.session.application(fx.app(MAIL)).and_then(|app| app.main_window);
    assert_eq!(main.and_then(|id| fx.session.window(id)).map(|w| w.window_number), Some(3));
    assert_eq!(
        fx.kinds(),
        vec![
            EventKind::ApplicationMainWindowChanged,
            EventKind::WindowCreated,
            EventKind::ApplicationMainWindowChanged,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_untagged_matching_value_confirms_command() {
    let fx = Fixture::new().await;
    fx.server.set_echo(false);
    let app = fx.app(MAIL);

    let pending = fx.session.submit(app, Mutation::SetHidden(true)).await.expect("submitted");
    fx.notify(RawNotification::Changed {
        object: OsRef::Application { pid: MAIL },
        value: AttributeValue::Hidden(true),
        tag: None,
    });

    assert!(pending.await.is_ok());
    fx.settle().await;
    let events = fx.take_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::ApplicationHiddenChanged);
    assert!(!events[0].is_external());
}

#[tokio::test(start_paused = true)]
async fn test_newer_command_supersedes_older() {
    let fx = Fixture::new().await;
    fx.server.set_echo(false);
    let window = fx.window(1);
    let first = Rect::new(0.0, 0.0, 500.0, 500.0);
    let second = Rect::new(50.0, 50.0, 600.0, 600.0);

    let c1 = fx.session.submit(window, Mutation::SetFrame(first)).await.expect("c1");
    let c1_tag = c1.tag();
    let c2 = fx.session.submit(window, Mutation::SetFrame(second)).await.expect("c2");
    let c2_tag = c2.tag();

    assert_eq!(c1.await, Err(CommandError::Superseded));

    // The older command's echo must not move the window back.
    fx.notify(RawNotification::Changed {
        object: OsRef::Window { pid: MAIL, window_number: 1 },
        value: AttributeValue::frame(first),
        tag: Some(c1_tag),
    });
    fx.settle().await;
    assert_eq!(fx.session.window(window).map(|w| w.frame), Some(Rect::new(100.0, 100.0, 800.0, 600.0)));
    assert!(fx.take_events().is_empty());

    fx.notify(RawNotification::Changed {
        object: OsRef::Window { pid: MAIL, window_number: 1 },
        value: AttributeValue::frame(second),
        tag: Some(c2_tag),
    });
    assert!(c2.await.is_ok());
    fx.settle().await;

    assert_eq!(fx.session.window(window).map(|w| w.frame), Some(second));
    assert_eq!(fx.kinds(), vec![EventKind::WindowResized]);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_then_late_confirmation_within_grace() {
    let fx = Fixture::new().await;
    fx.server.set_echo(false);
    let app = fx.app(MAIL);

    let pending = fx.session.submit(app, Mutation::SetHidden(true)).await.expect("submitted");
    let tag = pending.tag();
    assert_eq!(pending.await, Err(CommandError::Timeout));

    fx.notify(RawNotification::Changed {
        object: OsRef::Application { pid: MAIL },
        value: AttributeValue::Hidden(true),
        tag: Some(tag),
    });
    fx.settle().await;

    let events = fx.take_events();
    assert_eq!(events.len(), 1);
    assert!(!events[0].is_external(), "late confirmation within grace is internal");
}

#[tokio::test(start_paused = true)]
async fn test_confirmation_after_grace_is_external() {
    let fx = Fixture::new().await;
    fx.server.set_echo(false);
    let app = fx.app(MAIL);

    let pending = fx.session.submit(app, Mutation::SetHidden(true)).await.expect("submitted");
    assert_eq!(pending.await, Err(CommandError::Timeout));
    tokio::time::sleep(Duration::from_millis(400)).await;

    fx.notify(RawNotification::Changed {
        object: OsRef::Application { pid: MAIL },
        value: AttributeValue::Hidden(true),
        tag: None,
    });
    fx.settle().await;

    let events = fx.take_events();
    assert_eq!(events.len(), 1);
    assert!(events[0].is_external());
}

#[tokio::test(start_paused = true)]
async fn test_destroying_target_fails_pending_command() {
    let fx = Fixture::new().await;
    fx.server.set_echo(false);
    let window = fx.window(2);

    let pending = fx.session.submit(window, Mutation::SetMinimized(true)).await.expect("submitted");
    fx.notify(RawNotification::Destroyed { object: OsRef::Window { pid: MAIL, window_number: 2 } });

    assert_eq!(pending.await, Err(CommandError::TargetDestroyed(window.entity())));
    fx.settle().await;
    assert_eq!(fx.kinds(), vec![EventKind::WindowDestroyed]);
    assert!(fx.session.window(window).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_command_on_destroyed_window_is_not_found() {
    let fx = Fixture::new().await;
    let window = fx.window(2);
    fx.notify(RawNotification::Destroyed { object: OsRef::Window { pid: MAIL, window_number: 2 } });
    fx.settle().await;

    let result = fx.session.set_minimized(window, true).await;
    assert_eq!(result, Err(CommandError::NotFound(window.entity())));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_command_reports_boundary_failure() {
    let fx = Fixture::new().await;
    fx.server.reject_next(winsync_lib::reconciler::BoundaryError::Rejected {
        code: -25204,
        message: "cannot complete".into(),
    });

    let result = fx.session.set_hidden(fx.app(NOTES), true).await;
    assert!(matches!(result, Err(CommandError::BoundaryFailure(_))));

    // The slot was released, so the next command goes through.
    assert!(fx.session.set_hidden(fx.app(NOTES), true).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_set_frontmost_is_internal() {
    let fx = Fixture::new().await;

    let confirmation = fx.session.set_frontmost(fx.app(NOTES)).await;
    assert!(confirmation.is_ok());
    fx.settle().await;

    let events = fx.take_events();
    assert_eq!(events.len(), 1);
    let Event::FrontmostApplicationChanged { external, old, new } = &events[0] else {
        panic!("expected FrontmostApplicationChanged");
    };
    assert!(!external);
    assert_eq!(old.as_ref().map(|a| a.pid), Some(MAIL));
    assert_eq!(new.as_ref().map(|a| a.pid), Some(NOTES));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_termination_destroys_windows_first() {
    let fx = Fixture::new().await;
    fx.notify(RawNotification::Destroyed { object: OsRef::Application { pid: MAIL } });
    fx.settle().await;

    assert_eq!(
        fx.kinds(),
        vec![
            EventKind::WindowDestroyed,
            EventKind::WindowDestroyed,
            EventKind::FrontmostApplicationChanged,
            EventKind::ApplicationTerminated,
        ]
    );
    assert!(fx.session.windows().is_empty());
    assert!(fx.session.frontmost_application().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_window_for_unknown_app_launches_it() {
    let fx = Fixture::new().await;
    fx.notify(RawNotification::Created {
        object: ObjectInfo::Window {
            pid: 900,
            window_number: 1,
            title: "Terminal".into(),
            frame: Rect::new(10.0, 10.0, 640.0, 480.0),
            is_minimized: false,
            is_fullscreen: false,
        },
    });
    fx.settle().await;

    assert_eq!(fx.kinds(), vec![EventKind::ApplicationLaunched, EventKind::WindowCreated]);
}

#[tokio::test(start_paused = true)]
async fn test_moving_window_updates_placement() {
    let fx = Fixture::new().await;
    let window = fx.window(1);

    fx.change_window(1, AttributeValue::position(Point::new(2100.0, 100.0)));
    fx.settle().await;

    assert_eq!(fx.session.window_screen(window).map(|s| s.display_id), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_active_space_change() {
    let fx = Fixture::new().await;

    fx.notify(RawNotification::SpaceWillChange);
    fx.notify(RawNotification::ActiveSpacesChanged { space_ids: vec![11, 20] });
    fx.settle().await;
    assert_eq!(fx.kinds(), vec![EventKind::SpaceWillChange, EventKind::SpaceDidChange]);

    fx.notify(RawNotification::ActiveSpacesChanged { space_ids: vec![11, 20] });
    fx.settle().await;
    assert!(fx.take_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_screen_removal_reports_layout_change() {
    let fx = Fixture::new().await;
    fx.notify(RawNotification::Destroyed { object: OsRef::Screen { display_id: 2 } });
    fx.settle().await;

    let events = fx.take_events();
    assert_eq!(events.len(), 1);
    let Event::ScreenLayoutChanged { removed, .. } = &events[0] else {
        panic!("expected ScreenLayoutChanged");
    };
    assert_eq!(removed.iter().map(|s| s.display_id).collect::<Vec<_>>(), vec![2]);
    assert_eq!(fx.session.spaces().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_subscriber_is_isolated() {
    let fx = Fixture::new().await;
    fx.session.subscribe(EventKind::WindowTitleChanged, |_| panic!("subscriber bug"));

    fx.change_window(1, AttributeValue::Title("One".into()));
    fx.settle().await;
    fx.change_window(1, AttributeValue::Title("Two".into()));
    fx.settle().await;

    assert_eq!(fx.kinds(), vec![EventKind::WindowTitleChanged, EventKind::WindowTitleChanged]);
    assert!(fx.session.is_alive());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_handler_stops_receiving() {
    let fx = Fixture::new().await;
    let count = Arc::new(Mutex::new(0_usize));
    let counter = Arc::clone(&count);
    let id = fx.session.subscribe(EventKind::WindowTitleChanged, move |_| *counter.lock() += 1);

    fx.change_window(1, AttributeValue::Title("One".into()));
    fx.settle().await;
    assert!(fx.session.unsubscribe(id));
    fx.change_window(1, AttributeValue::Title("Two".into()));
    fx.settle().await;

    assert_eq!(*count.lock(), 1);
    assert!(!fx.session.unsubscribe(id));
}

#[tokio::test(start_paused = true)]
async fn test_destroy_closes_pending_commands_and_sink() {
    let fx = Fixture::new().await;
    fx.server.set_echo(false);

    let pending = fx.session.submit(fx.app(MAIL), Mutation::SetFrontmost).await.expect("submitted");
    let sink = fx.session.sink();
    fx.session.destroy().await;

    assert_eq!(pending.await, Err(CommandError::SessionClosed));
    assert!(sink.is_closed());
    assert!(!fx.server.notify(RawNotification::SpaceWillChange));
}
