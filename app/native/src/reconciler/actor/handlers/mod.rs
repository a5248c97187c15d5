//! Notification handlers for the reconciler.
//!
//! Handlers are organized by object kind:
//! - `app`: application launch/termination, hidden flag, window pointers, frontmost
//! - `screen`: screens, spaces, active-space transitions
//! - `window`: window creation/destruction and attribute changes
//!
//! Every handler runs the same steps: resolve the registry record, compute the
//! delta against the store, classify it, apply it, and queue the event.

mod app;
mod screen;
mod window;

pub use app::{on_app_launched, on_app_terminated, on_frontmost_changed};
pub use screen::{on_active_spaces_changed, on_screen_added, on_screen_removed, on_space_will_change};
pub use window::{on_window_created, on_window_destroyed};

use super::core::ReconcilerCore;
use super::pending::SlotKey;
use crate::reconciler::dispatch::Event;
use crate::reconciler::events::{AttributeValue, CommandTag, ObjectInfo};
use crate::reconciler::registry::OsRef;
use crate::reconciler::state::{
    AppId, Attribute, AttributeDelta, EntityKind, ScreenId, Snapshot, Value, WindowId,
};

/// Routes a creation notification by object kind.
pub fn on_created(core: &mut ReconcilerCore, object: ObjectInfo) {
    match object {
        ObjectInfo::Screen { display_id, name, frame, is_main } => {
            on_screen_added(core, display_id, name, frame, is_main);
        }
        ObjectInfo::Space { space_id, display_id, is_active } => {
            screen::on_space_added(core, space_id, display_id, is_active);
        }
        ObjectInfo::Application { pid, bundle_id, name, is_hidden, is_frontmost } => {
            on_app_launched(core, pid, bundle_id, name, is_hidden);
            if is_frontmost {
                on_frontmost_changed(core, Some(pid), None);
            }
        }
        ObjectInfo::Window { pid, window_number, title, frame, is_minimized, is_fullscreen } => {
            on_window_created(
                core,
                window::WindowInfo { pid, window_number, title, frame, is_minimized, is_fullscreen },
            );
        }
    }
}

/// Routes a destruction notification by object kind.
pub fn on_destroyed(core: &mut ReconcilerCore, object: OsRef) {
    match object.kind() {
        EntityKind::Screen => on_screen_removed(core, object),
        EntityKind::Space => screen::on_space_removed(core, object),
        EntityKind::Application => on_app_terminated(core, object),
        EntityKind::Window => on_window_destroyed(core, object),
    }
}

/// Routes an attribute change to the object it names.
///
/// Changes to unknown objects are dropped; a change never creates a record.
pub fn on_changed(
    core: &mut ReconcilerCore,
    object: OsRef,
    value: AttributeValue,
    tag: Option<CommandTag>,
) {
    let Some(id) = core.registry.lookup(&object) else {
        tracing::debug!("reconciler: dropping {} change for unknown {object}", value.attribute().as_str());
        return;
    };

    match object {
        OsRef::Window { .. } => window::on_window_changed(core, WindowId::assume(id), value, tag),
        OsRef::Application { pid } => app::on_app_changed(core, AppId::assume(id), pid, value, tag),
        OsRef::Screen { .. } => screen::on_screen_changed(core, ScreenId::assume(id), &value, tag),
        OsRef::Space { .. } => {
            tracing::debug!("reconciler: spaces carry no mutable attributes, dropping change");
        }
    }
}

/// Builds the event for an applied attribute delta.
///
/// Records are read from `snapshot` after the delta is applied.
#[must_use]
pub fn change_event(snapshot: &Snapshot, delta: &AttributeDelta, external: bool) -> Option<Event> {
    let Some(entity) = delta.entity else {
        return match (&delta.old, &delta.new) {
            (Value::App(old), Value::App(new)) => Some(Event::FrontmostApplicationChanged {
                external,
                old: old.and_then(|id| snapshot.application(id)).cloned(),
                new: new.and_then(|id| snapshot.application(id)).cloned(),
            }),
            _ => None,
        };
    };

    match entity.kind() {
        EntityKind::Window => {
            let window = snapshot.window(WindowId::assume(entity))?.clone();
            match (delta.attribute, &delta.old, &delta.new) {
                (Attribute::Frame, Value::Frame(old), Value::Frame(new)) => {
                    Some(Event::WindowResized { external, window, old: *old, new: *new })
                }
                (Attribute::Title, Value::Text(old), Value::Text(new)) => {
                    Some(Event::WindowTitleChanged { external, window, old: old.clone(), new: new.clone() })
                }
                (Attribute::Minimized, Value::Flag(old), Value::Flag(new)) => {
                    Some(Event::WindowMinimizedChanged { external, window, old: *old, new: *new })
                }
                (Attribute::Fullscreen, Value::Flag(old), Value::Flag(new)) => {
                    Some(Event::WindowFullscreenChanged { external, window, old: *old, new: *new })
                }
                _ => None,
            }
        }
        EntityKind::Application => {
            let application = snapshot.application(AppId::assume(entity))?.clone();
            let lookup = |value: &Option<WindowId>| value.and_then(|id| snapshot.window(id)).cloned();
            match (delta.attribute, &delta.old, &delta.new) {
                (Attribute::Hidden, Value::Flag(old), Value::Flag(new)) => {
                    Some(Event::ApplicationHiddenChanged { external, application, old: *old, new: *new })
                }
                (Attribute::MainWindow, Value::Window(old), Value::Window(new)) => {
                    Some(Event::ApplicationMainWindowChanged {
                        external,
                        application,
                        old: lookup(old),
                        new: lookup(new),
                    })
                }
                (Attribute::FocusedWindow, Value::Window(old), Value::Window(new)) => {
                    Some(Event::ApplicationFocusedWindowChanged {
                        external,
                        application,
                        old: lookup(old),
                        new: lookup(new),
                    })
                }
                _ => None,
            }
        }
        EntityKind::Screen if delta.attribute == Attribute::Frame => {
            let screen = snapshot.screen(ScreenId::assume(entity))?.clone();
            Some(Event::ScreenLayoutChanged {
                external,
                added: Vec::new(),
                removed: Vec::new(),
                changed: vec![screen],
            })
        }
        EntityKind::Screen | EntityKind::Space => None,
    }
}

/// Slot key for an attribute of an entity.
fn key(entity: impl Into<crate::reconciler::state::EntityId>, attribute: Attribute) -> SlotKey {
    SlotKey::new(Some(entity.into()), attribute)
}

// ============================================================================
// Tests
// ============================================================================
