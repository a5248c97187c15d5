//! Raw notification types produced by the window-server binding.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reconciler::registry::OsRef;
use crate::reconciler::state::{Attribute, Point, Rect, Size};

/// Correlation tag issued per command and echoed by the OS binding on the
/// notifications the command causes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTag(pub u64);

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "tag:{}", self.0) }
}

/// Initial attributes of an OS object, carried by creation notifications and
/// returned by discovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ObjectInfo {
    Screen {
        display_id: u32,
        #[serde(default)]
        name: String,
        frame: Rect,
        #[serde(default)]
        is_main: bool,
    },
    Space {
        space_id: u64,
        display_id: u32,
        /// Currently shown on its screen.
        #[serde(default)]
        is_active: bool,
    },
    Application {
        pid: i32,
        #[serde(default)]
        bundle_id: Option<String>,
        #[serde(default)]
        name: String,
        #[serde(default)]
        is_hidden: bool,
        #[serde(default)]
        is_frontmost: bool,
    },
    Window {
        pid: i32,
        window_number: u32,
        #[serde(default)]
        title: String,
        frame: Rect,
        #[serde(default)]
        is_minimized: bool,
        #[serde(default)]
        is_fullscreen: bool,
    },
}

impl ObjectInfo {
    /// The OS reference this object is known by.
    #[must_use]
    pub const fn os_ref(&self) -> OsRef {
        match *self {
            Self::Screen { display_id, .. } => OsRef::Screen { display_id },
            Self::Space { space_id, .. } => OsRef::Space { space_id },
            Self::Application { pid, .. } => OsRef::Application { pid },
            Self::Window { pid, window_number, .. } => OsRef::Window { pid, window_number },
        }
    }

    /// Parents sort before children: screens, spaces, applications, windows.
    #[must_use]
    pub const fn depth(&self) -> u8 {
        match self {
            Self::Screen { .. } => 0,
            Self::Space { .. } => 1,
            Self::Application { .. } => 2,
            Self::Window { .. } => 3,
        }
    }
}

/// New value of a changed attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "attribute", content = "value", rename_all = "camelCase")]
pub enum AttributeValue {
    /// Frame change. Position-only and size-only notifications leave the other
    /// half `None`; it is filled from the stored frame.
    Geometry {
        #[serde(default)]
        origin: Option<Point>,
        #[serde(default)]
        size: Option<Size>,
    },
    Title(String),
    Minimized(bool),
    Fullscreen(bool),
    Hidden(bool),
    /// Main window by window number within the same process.
    MainWindow(Option<u32>),
    /// Focused window by window number within the same process.
    FocusedWindow(Option<u32>),
}

impl AttributeValue {
    #[must_use]
    pub const fn frame(frame: Rect) -> Self {
        Self::Geometry { origin: Some(frame.origin()), size: Some(frame.size()) }
    }

    #[must_use]
    pub const fn position(origin: Point) -> Self { Self::Geometry { origin: Some(origin), size: None } }

    #[must_use]
    pub const fn size(size: Size) -> Self { Self::Geometry { origin: None, size: Some(size) } }

    /// The store attribute this value updates.
    #[must_use]
    pub const fn attribute(&self) -> Attribute {
        match self {
            Self::Geometry { .. } => Attribute::Frame,
            Self::Title(_) => Attribute::Title,
            Self::Minimized(_) => Attribute::Minimized,
            Self::Fullscreen(_) => Attribute::Fullscreen,
            Self::Hidden(_) => Attribute::Hidden,
            Self::MainWindow(_) => Attribute::MainWindow,
            Self::FocusedWindow(_) => Attribute::FocusedWindow,
        }
    }

    /// Folds a newer value for the same attribute into this one.
    ///
    /// Geometry merges component-wise; everything else is replaced.
    pub fn merge(&mut self, newer: Self) {
        match (self, newer) {
            (
                Self::Geometry { origin, size },
                Self::Geometry { origin: newer_origin, size: newer_size },
            ) => {
                if newer_origin.is_some() {
                    *origin = newer_origin;
                }
                if newer_size.is_some() {
                    *size = newer_size;
                }
            }
            (current, newer) => *current = newer,
        }
    }

    /// Resolves geometry against the stored frame.
    #[must_use]
    pub fn resolve_frame(&self, stored: Rect) -> Option<Rect> {
        match *self {
            Self::Geometry { origin, size } => Some(Rect::from_parts(
                origin.unwrap_or_else(|| stored.origin()),
                size.unwrap_or_else(|| stored.size()),
            )),
            _ => None,
        }
    }
}

/// A notification as pushed by the OS binding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RawNotification {
    Created {
        object: ObjectInfo,
    },
    Destroyed {
        object: OsRef,
    },
    Changed {
        object: OsRef,
        value: AttributeValue,
        #[serde(default)]
        tag: Option<CommandTag>,
    },
    FrontmostChanged {
        pid: Option<i32>,
        #[serde(default)]
        tag: Option<CommandTag>,
    },
    /// Active space per screen, in screen order.
    ActiveSpacesChanged {
        space_ids: Vec<u64>,
    },
    /// Advisory: a space transition is about to happen.
    SpaceWillChange,
}

impl RawNotification {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "Created",
            Self::Destroyed { .. } => "Destroyed",
            Self::Changed { .. } => "Changed",
            Self::FrontmostChanged { .. } => "FrontmostChanged",
            Self::ActiveSpacesChanged { .. } => "ActiveSpacesChanged",
            Self::SpaceWillChange => "SpaceWillChange",
        }
    }

    /// True for creation and destruction.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::Destroyed { .. })
    }
}
