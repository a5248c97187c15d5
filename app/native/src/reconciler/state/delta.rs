//! Typed state changes applied to the snapshot store.

use serde::{Deserialize, Serialize};

use super::types::{
    AppId, Application, EntityId, Rect, Screen, Space, SpaceId, Window, WindowId,
};

/// A mutable attribute of an entity (or of the desktop, for `Frontmost`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    /// Window or screen frame.
    Frame,
    Title,
    Minimized,
    Fullscreen,
    Hidden,
    MainWindow,
    FocusedWindow,
    /// Global frontmost application pointer.
    Frontmost,
    /// Active space of a screen.
    ActiveSpace,
}

impl Attribute {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Title => "title",
            Self::Minimized => "minimized",
            Self::Fullscreen => "fullscreen",
            Self::Hidden => "hidden",
            Self::MainWindow => "mainWindow",
            Self::FocusedWindow => "focusedWindow",
            Self::Frontmost => "frontmost",
            Self::ActiveSpace => "activeSpace",
        }
    }
}

/// An attribute value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    Frame(Rect),
    Text(String),
    Flag(bool),
    Window(Option<WindowId>),
    App(Option<AppId>),
    Space(Option<SpaceId>),
}

impl Value {
    /// Equality with frames compared within `tolerance`.
    #[must_use]
    pub fn same_as(&self, other: &Self, tolerance: f64) -> bool {
        match (self, other) {
            (Self::Frame(a), Self::Frame(b)) => a.approx_eq(b, tolerance),
            _ => self == other,
        }
    }
}

/// Before/after values of one attribute.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDelta {
    /// `None` only for the global frontmost pointer.
    pub entity: Option<EntityId>,
    pub attribute: Attribute,
    pub old: Value,
    pub new: Value,
}

/// A full entity record, used for creation deltas.
#[derive(Clone, Debug, PartialEq)]
pub enum Entity {
    Screen(Screen),
    Space(Space),
    Application(Application),
    Window(Window),
}

impl Entity {
    #[must_use]
    pub fn id(&self) -> EntityId {
        match self {
            Self::Screen(screen) => screen.id.entity(),
            Self::Space(space) => space.id.entity(),
            Self::Application(app) => app.id.entity(),
            Self::Window(window) => window.id.entity(),
        }
    }
}

/// The only way the snapshot store is mutated.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    Created(Entity),
    Destroyed(EntityId),
    Changed(AttributeDelta),
}
