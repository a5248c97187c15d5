//! Window creation, destruction, and attribute changes.

use super::{app, key};
use crate::reconciler::actor::core::ReconcilerCore;
use crate::reconciler::dispatch::Event;
use crate::reconciler::events::{AttributeValue, CommandTag};
use crate::reconciler::registry::OsRef;
use crate::reconciler::state::{Attribute, Delta, Entity, Rect, Value, Window, WindowId};

/// Attributes of a window as reported on creation.
#[derive(Debug)]
pub struct WindowInfo {
    pub pid: i32,
    pub window_number: u32,
    pub title: String,
    pub frame: Rect,
    pub is_minimized: bool,
    pub is_fullscreen: bool,
}

/// Registers a window under its application.
///
/// An unknown pid launches the application implicitly. A creation for a
/// window that is already live refreshes its attributes instead.
pub fn on_window_created(core: &mut ReconcilerCore, info: WindowInfo) {
    let Some(app_id) = app::ensure_application(core, info.pid) else {
        return;
    };

    let os_ref = OsRef::Window { pid: info.pid, window_number: info.window_number };
    let (id, created) = match core.registry.register_or_lookup(os_ref, Some(app_id.entity())) {
        Ok(registered) => registered,
        Err(err) => {
            tracing::warn!("reconciler: dropping creation of {os_ref}: {err}");
            return;
        }
    };
    let id = WindowId::assume(id);

    if !created {
        tracing::debug!("reconciler: {os_ref} already known as {id}, refreshing");
        refresh(core, id, info);
        return;
    }

    let window = Window {
        id,
        app: app_id,
        window_number: info.window_number,
        title: info.title,
        frame: info.frame,
        is_minimized: info.is_minimized,
        is_fullscreen: info.is_fullscreen,
        screen: None,
    };
    core.store.apply(&Delta::Created(Entity::Window(window)));

    // Placement is derived on insert, so read the stored record back.
    if let Some(window) = core.snapshot().window(id).cloned() {
        core.emit(Event::WindowCreated { external: true, window });
    }
}

fn refresh(core: &mut ReconcilerCore, id: WindowId, info: WindowInfo) {
    core.reconcile_and_emit(key(id, Attribute::Frame), Value::Frame(info.frame), None);
    core.reconcile_and_emit(key(id, Attribute::Title), Value::Text(info.title), None);
    core.reconcile_and_emit(key(id, Attribute::Minimized), Value::Flag(info.is_minimized), None);
    core.reconcile_and_emit(key(id, Attribute::Fullscreen), Value::Flag(info.is_fullscreen), None);
}

pub fn on_window_destroyed(core: &mut ReconcilerCore, os_ref: OsRef) {
    let Some(id) = core.registry.lookup(&os_ref) else {
        tracing::debug!("reconciler: dropping destruction of unknown {os_ref}");
        return;
    };
    let id = WindowId::assume(id);

    destroy_window(core, id, true);
    core.registry.retire(id.entity());
}

/// Removes a window from the store and emits `WindowDestroyed`.
///
/// With `clear_pointers`, main/focused pointers that referenced the window
/// are cleared first with their own events. During application termination
/// the pointers go away with the application and are not reported.
///
/// The caller retires the registry record.
pub(super) fn destroy_window(core: &mut ReconcilerCore, id: WindowId, clear_pointers: bool) {
    let cancelled = core.pending.cancel_target(id.entity());
    if cancelled > 0 {
        tracing::debug!("reconciler: {id} destroyed with {cancelled} pending command(s)");
    }

    let Some(window) = core.snapshot().window(id).cloned() else {
        return;
    };

    if clear_pointers && let Some(application) = core.snapshot().application(window.app) {
        let app_id = application.id;
        let main = application.main_window == Some(id);
        let focused = application.focused_window == Some(id);
        if main {
            core.reconcile_and_emit(key(app_id, Attribute::MainWindow), Value::Window(None), None);
        }
        if focused {
            core.reconcile_and_emit(key(app_id, Attribute::FocusedWindow), Value::Window(None), None);
        }
    }

    core.store.apply(&Delta::Destroyed(id.entity()));
    core.emit(Event::WindowDestroyed { external: true, window });
}

pub(super) fn on_window_changed(
    core: &mut ReconcilerCore,
    id: WindowId,
    value: AttributeValue,
    tag: Option<CommandTag>,
) {
    let Some(window) = core.snapshot().window(id) else {
        return;
    };

    let attribute = value.attribute();
    let new = match value {
        AttributeValue::Geometry { .. } => match value.resolve_frame(window.frame) {
            Some(frame) => Value::Frame(frame),
            None => return,
        },
        AttributeValue::Title(title) => Value::Text(title),
        AttributeValue::Minimized(flag) | AttributeValue::Fullscreen(flag) => Value::Flag(flag),
        AttributeValue::Hidden(_) | AttributeValue::MainWindow(_) | AttributeValue::FocusedWindow(_) => {
            tracing::debug!(
                "reconciler: windows carry no {} attribute, dropping change for {id}",
                attribute.as_str()
            );
            return;
        }
    };

    core.reconcile_and_emit(key(id, attribute), new, tag);
}
