//! Events delivered to subscribers.

use std::fmt;

use serde::Serialize;

use crate::reconciler::state::{Application, Rect, Screen, SpaceId, Window};

/// Subscription category; one per [`Event`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    SpaceWillChange,
    SpaceDidChange,
    FrontmostApplicationChanged,
    ApplicationLaunched,
    ApplicationTerminated,
    ApplicationHiddenChanged,
    ApplicationMainWindowChanged,
    ApplicationFocusedWindowChanged,
    WindowCreated,
    WindowDestroyed,
    WindowResized,
    WindowTitleChanged,
    WindowMinimizedChanged,
    WindowFullscreenChanged,
    ScreenLayoutChanged,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Debug::fmt(self, f) }
}

/// A classified state change.
///
/// `external` is false when the change was caused by a command issued
/// through this session.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    SpaceWillChange {
        external: bool,
        space_ids: Vec<SpaceId>,
    },
    SpaceDidChange {
        external: bool,
        space_ids: Vec<SpaceId>,
    },
    FrontmostApplicationChanged {
        external: bool,
        old: Option<Application>,
        new: Option<Application>,
    },
    ApplicationLaunched {
        external: bool,
        application: Application,
    },
    ApplicationTerminated {
        external: bool,
        application: Application,
    },
    ApplicationHiddenChanged {
        external: bool,
        application: Application,
        old: bool,
        new: bool,
    },
    ApplicationMainWindowChanged {
        external: bool,
        application: Application,
        old: Option<Window>,
        new: Option<Window>,
    },
    ApplicationFocusedWindowChanged {
        external: bool,
        application: Application,
        old: Option<Window>,
        new: Option<Window>,
    },
    WindowCreated {
        external: bool,
        window: Window,
    },
    WindowDestroyed {
        external: bool,
        window: Window,
    },
    WindowResized {
        external: bool,
        window: Window,
        old: Rect,
        new: Rect,
    },
    WindowTitleChanged {
        external: bool,
        window: Window,
        old: String,
        new: String,
    },
    WindowMinimizedChanged {
        external: bool,
        window: Window,
        old: bool,
        new: bool,
    },
    WindowFullscreenChanged {
        external: bool,
        window: Window,
        old: bool,
        new: bool,
    },
    ScreenLayoutChanged {
        external: bool,
        added: Vec<Screen>,
        removed: Vec<Screen>,
        changed: Vec<Screen>,
    },
}

impl Event {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::SpaceWillChange { .. } => EventKind::SpaceWillChange,
            Self::SpaceDidChange { .. } => EventKind::SpaceDidChange,
            Self::FrontmostApplicationChanged { .. } => EventKind::FrontmostApplicationChanged,
            Self::ApplicationLaunched { .. } => EventKind::ApplicationLaunched,
            Self::ApplicationTerminated { .. } => EventKind::ApplicationTerminated,
            Self::ApplicationHiddenChanged { .. } => EventKind::ApplicationHiddenChanged,
            Self::ApplicationMainWindowChanged { .. } => EventKind::ApplicationMainWindowChanged,
            Self::ApplicationFocusedWindowChanged { .. } => {
                EventKind::ApplicationFocusedWindowChanged
            }
            Self::WindowCreated { .. } => EventKind::WindowCreated,
            Self::WindowDestroyed { .. } => EventKind::WindowDestroyed,
            Self::WindowResized { .. } => EventKind::WindowResized,
            Self::WindowTitleChanged { .. } => EventKind::WindowTitleChanged,
            Self::WindowMinimizedChanged { .. } => EventKind::WindowMinimizedChanged,
            Self::WindowFullscreenChanged { .. } => EventKind::WindowFullscreenChanged,
            Self::ScreenLayoutChanged { .. } => EventKind::ScreenLayoutChanged,
        }
    }

    #[must_use]
    pub const fn is_external(&self) -> bool {
        match self {
            Self::SpaceWillChange { external, .. }
            | Self::SpaceDidChange { external, .. }
            | Self::FrontmostApplicationChanged { external, .. }
            | Self::ApplicationLaunched { external, .. }
            | Self::ApplicationTerminated { external, .. }
            | Self::ApplicationHiddenChanged { external, .. }
            | Self::ApplicationMainWindowChanged { external, .. }
            | Self::ApplicationFocusedWindowChanged { external, .. }
            | Self::WindowCreated { external, .. }
            | Self::WindowDestroyed { external, .. }
            | Self::WindowResized { external, .. }
            | Self::WindowTitleChanged { external, .. }
            | Self::WindowMinimizedChanged { external, .. }
            | Self::WindowFullscreenChanged { external, .. }
            | Self::ScreenLayoutChanged { external, .. } => *external,
        }
    }
}
