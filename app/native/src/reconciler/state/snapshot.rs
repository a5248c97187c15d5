//! The canonical current-state tree.
//!
//! A [`Snapshot`] is an immutable view once published. Only the reconciler
//! holds a writable copy (see [`super::SnapshotStore`]).

use serde::Serialize;

use super::delta::{Attribute, AttributeDelta, Delta, Entity, Value};
use super::types::{
    AppId, Application, EntityId, EntityKind, Rect, Screen, ScreenId, Space, SpaceId, Window,
    WindowId,
};
use crate::reconciler::registry::OsRef;

/// The full desktop model at one version.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    version: u64,
    screens: Vec<Screen>,
    spaces: Vec<Space>,
    applications: Vec<Application>,
    windows: Vec<Window>,
    frontmost: Option<AppId>,
}

impl Snapshot {
    /// Monotonic version, bumped by every applied delta.
    #[must_use]
    pub const fn version(&self) -> u64 { self.version }

    pub(crate) const fn bump_version(&mut self) { self.version += 1; }

    // ========================================================================
    // Reads
    // ========================================================================

    #[must_use]
    pub fn screens(&self) -> &[Screen] { &self.screens }

    /// The screen flagged as main, falling back to the first screen.
    #[must_use]
    pub fn main_screen(&self) -> Option<&Screen> {
        self.screens.iter().find(|s| s.is_main).or_else(|| self.screens.first())
    }

    #[must_use]
    pub fn spaces(&self) -> &[Space] { &self.spaces }

    #[must_use]
    pub fn applications(&self) -> &[Application] { &self.applications }

    #[must_use]
    pub fn windows(&self) -> &[Window] { &self.windows }

    #[must_use]
    pub const fn frontmost(&self) -> Option<AppId> { self.frontmost }

    #[must_use]
    pub fn frontmost_application(&self) -> Option<&Application> {
        self.frontmost.and_then(|id| self.application(id))
    }

    #[must_use]
    pub fn screen(&self, id: ScreenId) -> Option<&Screen> { self.screens.iter().find(|s| s.id == id) }

    #[must_use]
    pub fn space(&self, id: SpaceId) -> Option<&Space> { self.spaces.iter().find(|s| s.id == id) }

    /// Position of a space within its screen's ordered list.
    #[must_use]
    pub fn space_ordinal(&self, id: SpaceId) -> Option<usize> {
        let screen = self.space(id)?.screen?;
        self.screen(screen)?.spaces.iter().position(|s| *s == id)
    }

    /// Active spaces in screen order.
    #[must_use]
    pub fn active_spaces(&self) -> Vec<SpaceId> {
        self.screens.iter().filter_map(|s| s.active_space).collect()
    }

    #[must_use]
    pub fn application(&self, id: AppId) -> Option<&Application> {
        self.applications.iter().find(|a| a.id == id)
    }

    #[must_use]
    pub fn application_by_pid(&self, pid: i32) -> Option<&Application> {
        self.applications.iter().find(|a| a.pid == pid)
    }

    #[must_use]
    pub fn application_by_bundle_id(&self, bundle_id: &str) -> Option<&Application> {
        self.applications.iter().find(|a| a.bundle_id.as_deref() == Some(bundle_id))
    }

    #[must_use]
    pub fn window(&self, id: WindowId) -> Option<&Window> { self.windows.iter().find(|w| w.id == id) }

    /// Windows of `app` in creation order.
    #[must_use]
    pub fn windows_for(&self, app: AppId) -> Vec<&Window> {
        self.application(app)
            .map(|a| a.windows.iter().filter_map(|id| self.window(*id)).collect())
            .unwrap_or_default()
    }

    /// The screen a window is placed on.
    #[must_use]
    pub fn window_screen(&self, id: WindowId) -> Option<&Screen> {
        self.window(id).and_then(|w| w.screen).and_then(|s| self.screen(s))
    }

    /// Finds the entity currently recorded for an OS reference.
    #[must_use]
    pub fn resolve_os_ref(&self, os_ref: &OsRef) -> Option<EntityId> {
        match *os_ref {
            OsRef::Screen { display_id } => {
                self.screens.iter().find(|s| s.display_id == display_id).map(|s| s.id.entity())
            }
            OsRef::Space { space_id } => {
                self.spaces.iter().find(|s| s.os_space_id == space_id).map(|s| s.id.entity())
            }
            OsRef::Application { pid } => self.application_by_pid(pid).map(|a| a.id.entity()),
            OsRef::Window { pid, window_number } => {
                let app = self.application_by_pid(pid)?.id;
                self.windows
                    .iter()
                    .find(|w| w.app == app && w.window_number == window_number)
                    .map(|w| w.id.entity())
            }
        }
    }

    /// Returns true if the snapshot holds a record for `id`.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        match id.kind() {
            EntityKind::Screen => self.screen(ScreenId::assume(id)).is_some(),
            EntityKind::Space => self.space(SpaceId::assume(id)).is_some(),
            EntityKind::Application => self.application(AppId::assume(id)).is_some(),
            EntityKind::Window => self.window(WindowId::assume(id)).is_some(),
        }
    }

    // ========================================================================
    // Diffing
    // ========================================================================

    /// Current value of an attribute, or `None` if the entity is unknown or
    /// does not carry the attribute.
    #[must_use]
    pub fn value_of(&self, entity: Option<EntityId>, attribute: Attribute) -> Option<Value> {
        let Some(id) = entity else {
            return (attribute == Attribute::Frontmost).then_some(Value::App(self.frontmost));
        };

        match (id.kind(), attribute) {
            (EntityKind::Window, _) => {
                let window = self.window(WindowId::assume(id))?;
                match attribute {
                    Attribute::Frame => Some(Value::Frame(window.frame)),
                    Attribute::Title => Some(Value::Text(window.title.clone())),
                    Attribute::Minimized => Some(Value::Flag(window.is_minimized)),
                    Attribute::Fullscreen => Some(Value::Flag(window.is_fullscreen)),
                    _ => None,
                }
            }
            (EntityKind::Application, _) => {
                let app = self.application(AppId::assume(id))?;
                match attribute {
                    Attribute::Hidden => Some(Value::Flag(app.is_hidden)),
                    Attribute::MainWindow => Some(Value::Window(app.main_window)),
                    Attribute::FocusedWindow => Some(Value::Window(app.focused_window)),
                    _ => None,
                }
            }
            (EntityKind::Screen, Attribute::Frame) => {
                self.screen(ScreenId::assume(id)).map(|s| Value::Frame(s.frame))
            }
            (EntityKind::Screen, Attribute::ActiveSpace) => {
                self.screen(ScreenId::assume(id)).map(|s| Value::Space(s.active_space))
            }
            _ => None,
        }
    }

    /// Computes the delta that would bring `attribute` to `new`.
    ///
    /// Returns `None` when the stored value already equals `new` (frames
    /// within `tolerance`) or the attribute does not exist.
    #[must_use]
    pub fn diff(
        &self,
        entity: Option<EntityId>,
        attribute: Attribute,
        new: &Value,
        tolerance: f64,
    ) -> Option<AttributeDelta> {
        let old = self.value_of(entity, attribute)?;
        if old.same_as(new, tolerance) {
            return None;
        }
        Some(AttributeDelta { entity, attribute, old, new: new.clone() })
    }

    // ========================================================================
    // Mutation (reconciler only)
    // ========================================================================

    /// Applies a delta. Returns false if it did not apply.
    pub(crate) fn apply(&mut self, delta: &Delta) -> bool {
        match delta {
            Delta::Created(entity) => self.insert(entity.clone()),
            Delta::Destroyed(id) => self.remove(*id),
            Delta::Changed(change) => self.change(change),
        }
    }

    fn insert(&mut self, entity: Entity) -> bool {
        if self.contains(entity.id()) {
            return false;
        }

        match entity {
            Entity::Screen(screen) => {
                self.screens.push(screen);
                self.recompute_placements();
            }
            Entity::Space(space) => {
                if let Some(screen) = space.screen.and_then(|id| self.screen_mut(id))
                    && !screen.spaces.contains(&space.id)
                {
                    screen.spaces.push(space.id);
                }
                self.spaces.push(space);
            }
            Entity::Application(app) => self.applications.push(app),
            Entity::Window(mut window) => {
                window.screen = placement(&self.screens, &window.frame);
                if let Some(app) = self.application_mut(window.app)
                    && !app.windows.contains(&window.id)
                {
                    app.windows.push(window.id);
                }
                self.windows.push(window);
            }
        }
        true
    }

    fn remove(&mut self, id: EntityId) -> bool {
        if !self.contains(id) {
            return false;
        }

        match id.kind() {
            EntityKind::Screen => {
                let screen_id = ScreenId::assume(id);
                self.screens.retain(|s| s.id != screen_id);
                for space in self.spaces.iter_mut().filter(|s| s.screen == Some(screen_id)) {
                    space.screen = None;
                }
                self.recompute_placements();
            }
            EntityKind::Space => {
                let space_id = SpaceId::assume(id);
                self.spaces.retain(|s| s.id != space_id);
                for screen in &mut self.screens {
                    screen.spaces.retain(|s| *s != space_id);
                    if screen.active_space == Some(space_id) {
                        screen.active_space = None;
                    }
                }
            }
            EntityKind::Application => {
                let app_id = AppId::assume(id);
                self.applications.retain(|a| a.id != app_id);
                self.windows.retain(|w| w.app != app_id);
                if self.frontmost == Some(app_id) {
                    self.frontmost = None;
                }
            }
            EntityKind::Window => {
                let window_id = WindowId::assume(id);
                self.windows.retain(|w| w.id != window_id);
                for app in &mut self.applications {
                    app.windows.retain(|w| *w != window_id);
                    if app.main_window == Some(window_id) {
                        app.main_window = None;
                    }
                    if app.focused_window == Some(window_id) {
                        app.focused_window = None;
                    }
                }
            }
        }
        true
    }

    fn change(&mut self, change: &AttributeDelta) -> bool {
        let Some(id) = change.entity else {
            return match (change.attribute, &change.new) {
                (Attribute::Frontmost, Value::App(app)) => {
                    self.frontmost = *app;
                    true
                }
                _ => false,
            };
        };

        match (id.kind(), change.attribute, &change.new) {
            (EntityKind::Window, Attribute::Frame, Value::Frame(frame)) => {
                let screen = placement(&self.screens, frame);
                self.update_window(id, |w| {
                    w.frame = *frame;
                    w.screen = screen;
                })
            }
            (EntityKind::Window, Attribute::Title, Value::Text(title)) => {
                self.update_window(id, |w| w.title.clone_from(title))
            }
            (EntityKind::Window, Attribute::Minimized, Value::Flag(flag)) => {
                self.update_window(id, |w| w.is_minimized = *flag)
            }
            (EntityKind::Window, Attribute::Fullscreen, Value::Flag(flag)) => {
                self.update_window(id, |w| w.is_fullscreen = *flag)
            }
            (EntityKind::Application, Attribute::Hidden, Value::Flag(flag)) => {
                self.update_application(id, |a| a.is_hidden = *flag)
            }
            (EntityKind::Application, Attribute::MainWindow, Value::Window(window)) => {
                self.update_application(id, |a| a.main_window = *window)
            }
            (EntityKind::Application, Attribute::FocusedWindow, Value::Window(window)) => {
                self.update_application(id, |a| a.focused_window = *window)
            }
            (EntityKind::Screen, Attribute::Frame, Value::Frame(frame)) => {
                let Some(screen) = self.screen_mut(ScreenId::assume(id)) else {
                    return false;
                };
                screen.frame = *frame;
                self.recompute_placements();
                true
            }
            (EntityKind::Screen, Attribute::ActiveSpace, Value::Space(space)) => {
                let Some(screen) = self.screen_mut(ScreenId::assume(id)) else {
                    return false;
                };
                screen.active_space = *space;
                true
            }
            _ => false,
        }
    }

    fn update_window(&mut self, id: EntityId, f: impl FnOnce(&mut Window)) -> bool {
        let id = WindowId::assume(id);
        self.windows.iter_mut().find(|w| w.id == id).map(f).is_some()
    }

    fn update_application(&mut self, id: EntityId, f: impl FnOnce(&mut Application)) -> bool {
        self.application_mut(AppId::assume(id)).map(f).is_some()
    }

    fn application_mut(&mut self, id: AppId) -> Option<&mut Application> {
        self.applications.iter_mut().find(|a| a.id == id)
    }

    fn screen_mut(&mut self, id: ScreenId) -> Option<&mut Screen> {
        self.screens.iter_mut().find(|s| s.id == id)
    }

    fn recompute_placements(&mut self) {
        for window in &mut self.windows {
            window.screen = placement(&self.screens, &window.frame);
        }
    }
}

/// The screen with the largest overlap with `frame`.
#[must_use]
pub fn placement(screens: &[Screen], frame: &Rect) -> Option<ScreenId> {
    screens
        .iter()
        .map(|s| (s.id, s.frame.intersection_area(frame)))
        .filter(|(_, area)| *area > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use smallvec::SmallVec;

    use super::*;

    fn screen(index: u32, frame: Rect) -> Screen {
        Screen {
            id: ScreenId::assume(EntityId::new(EntityKind::Screen, index, 0)),
            display_id: index,
            name: format!("Display {index}"),
            frame,
            is_main: index == 0,
            spaces: SmallVec::new(),
            active_space: None,
        }
    }

    fn app(index: u32) -> Application {
        Application {
            id: AppId::assume(EntityId::new(EntityKind::Application, index, 0)),
            pid: 100 + i32::try_from(index).unwrap(),
            bundle_id: Some(format!("com.test.app{index}")),
            name: format!("App {index}"),
            is_hidden: false,
            main_window: None,
            focused_window: None,
            windows: SmallVec::new(),
        }
    }

    fn window(index: u32, app: AppId, frame: Rect) -> Window {
        Window {
            id: WindowId::assume(EntityId::new(EntityKind::Window, index, 0)),
            app,
            window_number: index,
            title: format!("Window {index}"),
            frame,
            is_minimized: false,
            is_fullscreen: false,
            screen: None,
        }
    }

    fn two_screen_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.apply(&Delta::Created(Entity::Screen(screen(0, Rect::new(0.0, 0.0, 1920.0, 1080.0)))));
        snapshot.apply(&Delta::Created(Entity::Screen(screen(1, Rect::new(1920.0, 0.0, 1920.0, 1080.0)))));
        snapshot
    }

    #[test]
    fn test_window_placement_uses_largest_overlap() {
        let mut snapshot = two_screen_snapshot();
        let app = app(2);
        let app_id = app.id;
        snapshot.apply(&Delta::Created(Entity::Application(app)));

        let w = window(3, app_id, Rect::new(1800.0, 0.0, 400.0, 300.0));
        let wid = w.id;
        snapshot.apply(&Delta::Created(Entity::Window(w)));

        assert_eq!(snapshot.window_screen(wid).map(|s| s.display_id), Some(1));
        assert_eq!(snapshot.windows_for(app_id).len(), 1);
    }

    #[test]
    fn test_diff_within_tolerance_is_empty() {
        let mut snapshot = two_screen_snapshot();
        let app = app(2);
        let app_id = app.id;
        snapshot.apply(&Delta::Created(Entity::Application(app)));
        let w = window(3, app_id, Rect::new(0.0, 0.0, 800.0, 600.0));
        let wid = w.id.entity();
        snapshot.apply(&Delta::Created(Entity::Window(w)));

        let same = Value::Frame(Rect::new(0.2, 0.0, 800.0, 600.0));
        assert!(snapshot.diff(Some(wid), Attribute::Frame, &same, 0.5).is_none());

        let moved = Value::Frame(Rect::new(10.0, 0.0, 800.0, 600.0));
        let delta = snapshot.diff(Some(wid), Attribute::Frame, &moved, 0.5).unwrap();
        assert_eq!(delta.old, Value::Frame(Rect::new(0.0, 0.0, 800.0, 600.0)));
        assert_eq!(delta.new, moved);
    }

    #[test]
    fn test_diff_unknown_attribute_is_none() {
        let mut snapshot = Snapshot::default();
        let app = app(1);
        let app_id = app.id.entity();
        snapshot.apply(&Delta::Created(Entity::Application(app)));

        assert!(snapshot.diff(Some(app_id), Attribute::Title, &Value::Text("x".into()), 0.5).is_none());
    }

    #[test]
    fn test_destroying_window_clears_app_pointers() {
        let mut snapshot = Snapshot::default();
        let app = app(1);
        let app_id = app.id;
        snapshot.apply(&Delta::Created(Entity::Application(app)));
        let w = window(2, app_id, Rect::new(0.0, 0.0, 10.0, 10.0));
        let wid = w.id;
        snapshot.apply(&Delta::Created(Entity::Window(w)));
        snapshot.apply(&Delta::Changed(AttributeDelta {
            entity: Some(app_id.entity()),
            attribute: Attribute::MainWindow,
            old: Value::Window(None),
            new: Value::Window(Some(wid)),
        }));

        assert!(snapshot.apply(&Delta::Destroyed(wid.entity())));
        let app = snapshot.application(app_id).unwrap();
        assert!(app.main_window.is_none());
        assert!(app.windows.is_empty());
    }

    #[test]
    fn test_space_membership_and_ordinal() {
        let mut snapshot = two_screen_snapshot();
        let screen_id = snapshot.screens()[1].id;
        for index in 0..2 {
            snapshot.apply(&Delta::Created(Entity::Space(Space {
                id: SpaceId::assume(EntityId::new(EntityKind::Space, 10 + index, 0)),
                os_space_id: u64::from(index),
                screen: Some(screen_id),
            })));
        }

        let second = SpaceId::assume(EntityId::new(EntityKind::Space, 11, 0));
        assert_eq!(snapshot.space_ordinal(second), Some(1));

        assert!(snapshot.apply(&Delta::Destroyed(second.entity())));
        assert_eq!(snapshot.screen(screen_id).unwrap().spaces.len(), 1);
    }

    #[test]
    fn test_resolve_os_ref() {
        let mut snapshot = Snapshot::default();
        let app = app(1);
        let app_id = app.id;
        snapshot.apply(&Delta::Created(Entity::Application(app)));
        let w = window(7, app_id, Rect::new(0.0, 0.0, 10.0, 10.0));
        let wid = w.id;
        snapshot.apply(&Delta::Created(Entity::Window(w)));

        let os_ref = OsRef::Window { pid: 101, window_number: 7 };
        assert_eq!(snapshot.resolve_os_ref(&os_ref), Some(wid.entity()));
        assert_eq!(snapshot.resolve_os_ref(&OsRef::Application { pid: 999 }), None);
    }
}
