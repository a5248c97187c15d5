//! Screens, spaces, and active-space transitions.

use smallvec::SmallVec;

use super::key;
use crate::reconciler::actor::core::ReconcilerCore;
use crate::reconciler::dispatch::Event;
use crate::reconciler::events::{AttributeValue, CommandTag};
use crate::reconciler::registry::OsRef;
use crate::reconciler::state::{
    Attribute, Delta, Entity, Rect, Screen, ScreenId, Space, SpaceId, Value,
};

pub fn on_screen_added(core: &mut ReconcilerCore, display_id: u32, name: String, frame: Rect, is_main: bool) {
    let os_ref = OsRef::Screen { display_id };
    let (id, created) = match core.registry.register_or_lookup(os_ref, None) {
        Ok(registered) => registered,
        Err(err) => {
            tracing::warn!("reconciler: dropping creation of {os_ref}: {err}");
            return;
        }
    };
    let id = ScreenId::assume(id);

    if !created {
        core.reconcile_and_emit(key(id, Attribute::Frame), Value::Frame(frame), None);
        return;
    }

    let screen = Screen {
        id,
        display_id,
        name,
        frame,
        is_main,
        spaces: SmallVec::new(),
        active_space: None,
    };
    core.store.apply(&Delta::Created(Entity::Screen(screen.clone())));
    core.emit(Event::ScreenLayoutChanged {
        external: true,
        added: vec![screen],
        removed: Vec::new(),
        changed: Vec::new(),
    });
}

/// Removes a screen together with its spaces.
pub fn on_screen_removed(core: &mut ReconcilerCore, os_ref: OsRef) {
    let Some(id) = core.registry.lookup(&os_ref) else {
        tracing::debug!("reconciler: dropping removal of unknown {os_ref}");
        return;
    };
    let id = ScreenId::assume(id);

    // Spaces are registered under their screen and retire with it.
    for retired in core.registry.retire(id.entity()) {
        if retired != id.entity() {
            core.store.apply(&Delta::Destroyed(retired));
        }
    }

    let Some(screen) = core.snapshot().screen(id).cloned() else {
        return;
    };
    core.store.apply(&Delta::Destroyed(id.entity()));
    core.emit(Event::ScreenLayoutChanged {
        external: true,
        added: Vec::new(),
        removed: vec![screen],
        changed: Vec::new(),
    });
}

pub(super) fn on_screen_changed(
    core: &mut ReconcilerCore,
    id: ScreenId,
    value: &AttributeValue,
    tag: Option<CommandTag>,
) {
    let Some(frame) = core.snapshot().screen(id).and_then(|screen| value.resolve_frame(screen.frame)) else {
        tracing::debug!(
            "reconciler: screens carry no {} attribute, dropping change for {id}",
            value.attribute().as_str()
        );
        return;
    };

    core.reconcile_and_emit(key(id, Attribute::Frame), Value::Frame(frame), tag);
}

/// Registers a space under its screen.
///
/// A space created as active becomes its screen's active space without a
/// `SpaceDidChange`; the next active-spaces notification reports it.
pub(super) fn on_space_added(core: &mut ReconcilerCore, space_id: u64, display_id: u32, is_active: bool) {
    let screen = core.registry.lookup(&OsRef::Screen { display_id }).map(ScreenId::assume);
    let Some(id) = register_space(core, space_id, screen) else {
        return;
    };

    if is_active && let Some(screen) = screen {
        core.reconcile_and_emit(key(screen, Attribute::ActiveSpace), Value::Space(Some(id)), None);
    }
}

fn register_space(core: &mut ReconcilerCore, space_id: u64, screen: Option<ScreenId>) -> Option<SpaceId> {
    let os_ref = OsRef::Space { space_id };
    let (id, created) =
        match core.registry.register_or_lookup(os_ref, screen.map(ScreenId::entity)) {
            Ok(registered) => registered,
            Err(err) => {
                tracing::warn!("reconciler: dropping creation of {os_ref}: {err}");
                return None;
            }
        };
    let id = SpaceId::assume(id);

    if created {
        core.store.apply(&Delta::Created(Entity::Space(Space { id, os_space_id: space_id, screen })));
    }
    Some(id)
}

pub(super) fn on_space_removed(core: &mut ReconcilerCore, os_ref: OsRef) {
    let Some(id) = core.registry.lookup(&os_ref) else {
        tracing::debug!("reconciler: dropping removal of unknown {os_ref}");
        return;
    };

    core.registry.retire(id);
    core.store.apply(&Delta::Destroyed(id));
}

/// Applies the active space of every screen and emits `SpaceDidChange`.
///
/// `space_ids` lists one space per screen, in screen order. Unknown spaces
/// are registered on the screen they are reported for.
pub fn on_active_spaces_changed(core: &mut ReconcilerCore, space_ids: &[u64]) {
    let screens: Vec<ScreenId> = core.snapshot().screens().iter().map(|screen| screen.id).collect();
    if space_ids.len() != screens.len() {
        tracing::debug!(
            "reconciler: {} active spaces reported for {} screens",
            space_ids.len(),
            screens.len()
        );
    }

    let mut changed = false;
    let mut active = Vec::with_capacity(space_ids.len());
    for (position, &space_id) in space_ids.iter().enumerate() {
        let screen = screens.get(position).copied();
        let id = match core.registry.lookup(&OsRef::Space { space_id }) {
            Some(id) => SpaceId::assume(id),
            None => match register_space(core, space_id, screen) {
                Some(id) => id,
                None => continue,
            },
        };
        active.push(id);

        if let Some(screen) = screen {
            changed |= core
                .reconcile(key(screen, Attribute::ActiveSpace), Value::Space(Some(id)), None)
                .is_some();
        }
    }

    if changed {
        core.emit(Event::SpaceDidChange { external: true, space_ids: active });
    } else {
        tracing::trace!("reconciler: active spaces unchanged");
    }
}

/// Advisory only; the store is not touched.
pub fn on_space_will_change(core: &mut ReconcilerCore) {
    let space_ids = core.snapshot().active_spaces();
    core.emit(Event::SpaceWillChange { external: true, space_ids });
}
