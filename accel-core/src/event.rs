//! Events flowing into and out of the bridge.

use serde::{Deserialize, Serialize};

use crate::geometry::ElementId;

/// A pointer event from the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PointerEvent {
    /// The pointer moved to a canvas position.
    Move {
        /// X position in canvas coordinates.
        x: f32,
        /// Y position in canvas coordinates.
        y: f32,
    },
    /// The pointer is over an element.
    Hover {
        /// Hovered element.
        element_id: ElementId,
    },
    /// The pointer was clicked.
    Click,
}

/// A raw keyboard event to translate into an editor action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyEvent {
    /// Key value, e.g. `"z"` or `"Delete"`.
    pub key: String,
    /// Control held.
    #[serde(default)]
    pub ctrl: bool,
    /// Shift held.
    #[serde(default)]
    pub shift: bool,
    /// Alt/Option held.
    #[serde(default)]
    pub alt: bool,
    /// Meta/Command held.
    #[serde(default)]
    pub meta: bool,
}

impl KeyEvent {
    /// A key with no modifiers.
    #[must_use]
    pub fn plain(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Add the control modifier.
    #[must_use]
    pub const fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    /// Add the shift modifier.
    #[must_use]
    pub const fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }
}

/// Notification published to bridge subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A frame tick completed.
    Frame {
        /// Elapsed seconds, after capping.
        dt: f32,
        /// Number of values in the module's transform batch.
        transforms: usize,
    },
    /// The watchdog detected a stall and ran recovery.
    StallRecovered {
        /// Whether a snapshot was pushed back through the bridge.
        restored: bool,
    },
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);
