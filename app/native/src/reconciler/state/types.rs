//! Core state types for the reconciler.
//!
//! These types form a relational structure:
//! - `Screen` represents physical displays (OS display id)
//! - `Space` represents virtual workspaces, ordered per screen
//! - `Application` represents running processes (pid + bundle id)
//! - `Window` represents windows owned by an application
//!
//! Relations:
//! - `Space.screen` → `Screen.id`, `Screen.spaces` → ordered `Space.id`s
//! - `Window.app` → `Application.id`, `Application.windows` → `Window.id`s
//! - `Window.screen` → `Screen.id` (derived from the frame, never authoritative)

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ============================================================================
// Identity Types
// ============================================================================

/// The kind of object an [`EntityId`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Screen,
    Space,
    Application,
    Window,
}

impl EntityKind {
    /// Returns the kind name as a static lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Space => "space",
            Self::Application => "application",
            Self::Window => "window",
        }
    }
}

/// A generational identity handed out by the entity registry.
///
/// The `(index, generation)` pair is never reused for a different OS object
/// within a session, so a stale id can never alias a newer object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    kind: EntityKind,
    index: u32,
    generation: u32,
}

impl EntityId {
    pub(crate) const fn new(kind: EntityKind, index: u32, generation: u32) -> Self {
        Self { kind, index, generation }
    }

    /// The kind of object this id refers to.
    #[must_use]
    pub const fn kind(self) -> EntityKind { self.kind }

    /// Slot index inside the registry.
    #[must_use]
    pub const fn index(self) -> u32 { self.index }

    /// Generation of the slot when this id was assigned.
    #[must_use]
    pub const fn generation(self) -> u32 { self.generation }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.kind.as_str(), self.index, self.generation)
    }
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(EntityId);

        impl $name {
            /// Converts an untyped id, returning `None` if it refers to another kind.
            #[must_use]
            pub fn from_entity(id: EntityId) -> Option<Self> {
                (id.kind() == EntityKind::$kind).then_some(Self(id))
            }

            pub(crate) fn assume(id: EntityId) -> Self {
                debug_assert_eq!(id.kind(), EntityKind::$kind);
                Self(id)
            }

            /// Returns the untyped registry id.
            #[must_use]
            pub const fn entity(self) -> EntityId { self.0 }
        }

        impl From<$name> for EntityId {
            fn from(id: $name) -> Self { id.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
        }
    };
}

typed_id!(
    /// Identity of a [`Screen`].
    ScreenId => Screen
);
typed_id!(
    /// Identity of a [`Space`].
    SpaceId => Space
);
typed_id!(
    /// Identity of an [`Application`].
    AppId => Application
);
typed_id!(
    /// Identity of a [`Window`].
    WindowId => Window
);

/// Ordered space membership of a screen. Inline for the common case.
pub type SpaceIdList = SmallVec<[SpaceId; 4]>;

/// Windows known for an application, in creation order.
pub type WindowIdList = SmallVec<[WindowId; 8]>;

// ============================================================================
// Geometry Types
// ============================================================================

/// A point in global screen coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self { Self { x, y } }
}

/// A width/height pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self { Self { width, height } }
}

/// A rectangle with position and size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Create a zero-sized rectangle at origin.
    #[must_use]
    pub const fn zero() -> Self { Self::new(0.0, 0.0, 0.0, 0.0) }

    /// Builds a rectangle from an origin and a size.
    #[must_use]
    pub const fn from_parts(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    #[must_use]
    pub const fn origin(&self) -> Point { Point::new(self.x, self.y) }

    #[must_use]
    pub const fn size(&self) -> Size { Size::new(self.width, self.height) }

    /// Returns a copy moved to `origin`.
    #[must_use]
    pub const fn with_origin(self, origin: Point) -> Self { Self::from_parts(origin, self.size()) }

    /// Returns a copy resized to `size`.
    #[must_use]
    pub const fn with_size(self, size: Size) -> Self { Self::from_parts(self.origin(), size) }

    /// Check if this rectangle has valid dimensions.
    #[must_use]
    pub fn is_valid(&self) -> bool { self.width > 0.0 && self.height > 0.0 }

    /// Check if this rectangle contains a point.
    #[must_use]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    /// Area of the overlap with `other` (zero when disjoint).
    #[must_use]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let width = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
        let height = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
        if width <= 0.0 || height <= 0.0 { 0.0 } else { width * height }
    }

    /// Get the center point of this rectangle.
    #[must_use]
    pub fn center(&self) -> (f64, f64) { (self.x + self.width / 2.0, self.y + self.height / 2.0) }

    /// Check if two rectangles are approximately equal (within epsilon).
    #[must_use]
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.width - other.width).abs() <= epsilon
            && (self.height - other.height).abs() <= epsilon
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

// ============================================================================
// Entity Records
// ============================================================================

/// A physical display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Screen {
    pub id: ScreenId,

    /// OS display identifier.
    pub display_id: u32,

    /// Display name (e.g., "Built-in Retina Display").
    pub name: String,

    /// Full frame in global coordinates.
    pub frame: Rect,

    /// Is this the main display?
    pub is_main: bool,

    /// Spaces on this screen, in OS order.
    pub spaces: SpaceIdList,

    /// The space currently shown on this screen.
    pub active_space: Option<SpaceId>,
}

impl Screen {
    /// Human-readable description, used by the CLI and diagnostics.
    #[must_use]
    pub fn debug_description(&self) -> String {
        format!("{} \"{}\" {} ({} spaces)", self.id, self.name, self.frame, self.spaces.len())
    }
}

/// A virtual workspace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: SpaceId,

    /// OS space identifier.
    pub os_space_id: u64,

    /// Screen the space belongs to.
    pub screen: Option<ScreenId>,
}

/// A running application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: AppId,

    /// Process id. Immutable for the lifetime of the record.
    pub pid: i32,

    /// Bundle identifier. Immutable for the lifetime of the record.
    pub bundle_id: Option<String>,

    /// Display name.
    pub name: String,

    pub is_hidden: bool,

    pub main_window: Option<WindowId>,

    pub focused_window: Option<WindowId>,

    /// Known windows in creation order.
    pub windows: WindowIdList,
}

/// A window owned by an application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub id: WindowId,

    /// Owning application (back-reference by id, never ownership).
    pub app: AppId,

    /// OS window number, unique within the owning process.
    pub window_number: u32,

    pub title: String,

    pub frame: Rect,

    pub is_minimized: bool,

    pub is_fullscreen: bool,

    /// Screen with the largest overlap with `frame`. Derived.
    pub screen: Option<ScreenId>,
}

// ============================================================================
// Tests
// ============================================================================
