//! Application lifecycle, application attributes, and the frontmost pointer.

use smallvec::SmallVec;

use super::window::destroy_window;
use super::key;
use crate::reconciler::actor::core::ReconcilerCore;
use crate::reconciler::actor::pending::SlotKey;
use crate::reconciler::dispatch::Event;
use crate::reconciler::events::{AttributeValue, CommandTag};
use crate::reconciler::registry::OsRef;
use crate::reconciler::state::{AppId, Application, Attribute, Delta, Entity, Value, WindowId};

/// Registers an application and emits `ApplicationLaunched`.
///
/// A launch for a pid that is already live refreshes the hidden flag.
pub fn on_app_launched(
    core: &mut ReconcilerCore,
    pid: i32,
    bundle_id: Option<String>,
    name: String,
    is_hidden: bool,
) -> Option<AppId> {
    let os_ref = OsRef::Application { pid };
    let (id, created) = match core.registry.register_or_lookup(os_ref, None) {
        Ok(registered) => registered,
        Err(err) => {
            tracing::warn!("reconciler: dropping launch of {os_ref}: {err}");
            return None;
        }
    };
    let id = AppId::assume(id);

    if !created {
        core.reconcile_and_emit(key(id, Attribute::Hidden), Value::Flag(is_hidden), None);
        return Some(id);
    }

    let application = Application {
        id,
        pid,
        bundle_id,
        name,
        is_hidden,
        main_window: None,
        focused_window: None,
        windows: SmallVec::new(),
    };
    core.store.apply(&Delta::Created(Entity::Application(application.clone())));
    core.emit(Event::ApplicationLaunched { external: true, application });
    Some(id)
}

/// Returns the application for `pid`, launching it implicitly if unknown.
pub(super) fn ensure_application(core: &mut ReconcilerCore, pid: i32) -> Option<AppId> {
    if let Some(id) = core.registry.lookup(&OsRef::Application { pid }) {
        return Some(AppId::assume(id));
    }
    tracing::debug!("reconciler: window for unknown pid {pid}, launching application implicitly");
    on_app_launched(core, pid, None, String::new(), false)
}

/// Tears an application down.
///
/// Emits `WindowDestroyed` for every window, then clears the frontmost
/// pointer if it referenced the application, then `ApplicationTerminated`.
pub fn on_app_terminated(core: &mut ReconcilerCore, os_ref: OsRef) {
    let Some(id) = core.registry.lookup(&os_ref) else {
        tracing::debug!("reconciler: dropping termination of unknown {os_ref}");
        return;
    };
    let id = AppId::assume(id);

    let windows: SmallVec<[WindowId; 8]> = core
        .snapshot()
        .application(id)
        .map(|application| application.windows.clone())
        .unwrap_or_default();
    for window in windows {
        destroy_window(core, window, false);
    }

    core.pending.cancel_target(id.entity());

    if core.snapshot().frontmost() == Some(id) {
        core.reconcile_and_emit(SlotKey::new(None, Attribute::Frontmost), Value::App(None), None);
    }

    let retired = core.registry.retire(id.entity());
    if let Some(application) = core.snapshot().application(id).cloned() {
        core.store.apply(&Delta::Destroyed(id.entity()));
        core.emit(Event::ApplicationTerminated { external: true, application });
    }
    tracing::debug!("reconciler: {id} terminated ({} records retired)", retired.len());
}

pub(super) fn on_app_changed(
    core: &mut ReconcilerCore,
    id: AppId,
    pid: i32,
    value: AttributeValue,
    tag: Option<CommandTag>,
) {
    let attribute = value.attribute();
    let new = match value {
        AttributeValue::Hidden(flag) => Value::Flag(flag),
        AttributeValue::MainWindow(number) | AttributeValue::FocusedWindow(number) => {
            match number {
                None => Value::Window(None),
                Some(window_number) => {
                    let os_ref = OsRef::Window { pid, window_number };
                    let Some(window) = core.registry.lookup(&os_ref) else {
                        tracing::debug!(
                            "reconciler: {} points at unknown {os_ref}, dropping",
                            attribute.as_str()
                        );
                        return;
                    };
                    Value::Window(Some(WindowId::assume(window)))
                }
            }
        }
        _ => {
            tracing::debug!(
                "reconciler: applications carry no {} attribute, dropping change for {id}",
                attribute.as_str()
            );
            return;
        }
    };

    core.reconcile_and_emit(key(id, attribute), new, tag);
}

/// Updates the global frontmost pointer.
///
/// A pid that is not a known application is dropped.
pub fn on_frontmost_changed(core: &mut ReconcilerCore, pid: Option<i32>, tag: Option<CommandTag>) {
    let app = match pid {
        None => None,
        Some(pid) => match core.registry.lookup(&OsRef::Application { pid }) {
            Some(id) => Some(AppId::assume(id)),
            None => {
                tracing::debug!("reconciler: frontmost pid {pid} is not a known application");
                return;
            }
        },
    };

    core.reconcile_and_emit(SlotKey::new(None, Attribute::Frontmost), Value::App(app), tag);
}
