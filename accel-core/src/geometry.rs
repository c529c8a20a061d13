//! Element identity and canvas geometry.

use serde::{Deserialize, Serialize};

/// Identifier of a canvas element, as assigned by the document store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    /// Wrap an editor-provided id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ElementId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::borrow::Borrow<str> for ElementId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for ElementId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An axis-aligned rectangle in canvas pixels, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// Create a rectangle.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Right edge.
    #[must_use]
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    /// Bottom edge.
    #[must_use]
    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    /// Grow the rectangle by `amount` on every side.
    #[must_use]
    pub fn expand(&self, amount: f32) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            self.width + amount * 2.0,
            self.height + amount * 2.0,
        )
    }

    /// Whether every edge is a finite number.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.max_x().is_finite()
            && self.max_y().is_finite()
    }

    /// Closed-interval intersection test; touching edges intersect.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.x <= other.max_x()
            && other.x <= self.max_x()
            && self.y <= other.max_y()
            && other.y <= self.max_y()
    }
}

/// Direction of a snap guide line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// A vertical line at an x coordinate.
    Vertical,
    /// A horizontal line at a y coordinate.
    Horizontal,
}

/// A guide line drawn while an element snaps to a neighbour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapGuide {
    /// Line direction.
    pub orientation: Orientation,
    /// Coordinate of the line on its axis.
    pub value: f32,
    /// Optional caption.
    pub label: String,
}

/// Outcome of a snap query: the adjusted position and the guides to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapResult {
    /// Snapped left edge.
    pub x: f32,
    /// Snapped top edge.
    pub y: f32,
    /// Guides for every alignment that matched.
    pub guides: Vec<SnapGuide>,
}

impl SnapResult {
    /// Guides with the given orientation.
    pub fn guides_with(&self, orientation: Orientation) -> impl Iterator<Item = &SnapGuide> {
        self.guides
            .iter()
            .filter(move |g| g.orientation == orientation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_edges_and_expand() {
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert!((r.max_x() - 40.0).abs() < f32::EPSILON);
        assert!((r.max_y() - 60.0).abs() < f32::EPSILON);

        let grown = r.expand(5.0);
        assert_eq!(grown, Rect::new(5.0, 15.0, 40.0, 50.0));
    }

    #[test]
    fn touching_rects_intersect() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 0.0, 10.0, 10.0);
        let c = Rect::new(10.5, 0.0, 10.0, 10.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn non_finite_edges_are_detected() {
        assert!(Rect::new(0.0, 0.0, 10.0, 10.0).is_finite());
        assert!(!Rect::new(f32::NAN, 0.0, 10.0, 10.0).is_finite());
        assert!(!Rect::new(0.0, 0.0, f32::INFINITY, 10.0).is_finite());
        // Both parts finite, right edge overflows.
        assert!(!Rect::new(f32::MAX, 0.0, f32::MAX, 10.0).is_finite());
    }

    #[test]
    fn element_id_compares_with_str() {
        let id = ElementId::from("hero");
        assert_eq!(id, "hero");
        assert_eq!(id.to_string(), "hero");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"hero\"");
    }
}
