//! # Spatial Index
//!
//! R-tree over element bounding boxes. Always available, so geometry
//! queries never wait on the external compute module.
//!
//! ```text
//!   update_element(id, rect)
//!        │
//!        ├── remove old entry for id (if any)
//!        └── insert new entry           → exactly one entry per id
//!
//!   query(rect)             → ids whose bounds intersect rect (edges inclusive)
//!   find_snap_targets(...)  → snapped position + guide lines
//! ```
//!
//! Result order follows the tree structure and may change as the tree is
//! rebalanced; callers must not depend on it.

use std::collections::HashMap;

use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{ElementId, Orientation, Rect, SnapGuide, SnapResult};

/// One indexed element.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialItem {
    /// Element id.
    pub id: ElementId,
    /// Left edge.
    pub min_x: f32,
    /// Top edge.
    pub min_y: f32,
    /// Right edge.
    pub max_x: f32,
    /// Bottom edge.
    pub max_y: f32,
}

impl SpatialItem {
    fn from_rect(id: ElementId, rect: Rect) -> Self {
        Self {
            id,
            min_x: rect.x,
            min_y: rect.y,
            max_x: rect.max_x(),
            max_y: rect.max_y(),
        }
    }

    /// The item's bounds as a rectangle.
    #[must_use]
    pub fn rect(&self) -> Rect {
        Rect::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x,
            self.max_y - self.min_y,
        )
    }
}

impl RTreeObject for SpatialItem {
    type Envelope = AABB<[f32; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }
}

// Keeps envelope areas representable so the tree's comparisons stay total.
const MAX_COORDINATE: f32 = 1.0e9;

fn indexable(rect: &Rect) -> bool {
    rect.is_finite()
        && [rect.x, rect.y, rect.max_x(), rect.max_y()]
            .iter()
            .all(|v| v.abs() <= MAX_COORDINATE)
}

fn envelope(rect: &Rect) -> AABB<[f32; 2]> {
    AABB::from_corners([rect.x, rect.y], [rect.max_x(), rect.max_y()])
}

/// Bounding-box index over canvas elements.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<SpatialItem>,
    // RTree removal needs the stored value, so keep it by id.
    items: HashMap<ElementId, SpatialItem>,
}

impl SpatialIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index or re-index an element's bounds.
    ///
    /// Bounds with a non-finite or out-of-range edge are ignored and any
    /// previous entry for `id` is kept.
    pub fn update_element(&mut self, id: impl Into<ElementId>, rect: Rect) {
        let id = id.into();
        if !indexable(&rect) {
            tracing::debug!("Ignoring unindexable bounds for {id}: {rect:?}");
            return;
        }
        self.remove_element(id.as_str());

        let item = SpatialItem::from_rect(id.clone(), rect);
        self.tree.insert(item.clone());
        self.items.insert(id, item);
    }

    /// Drop an element from the index. Returns whether it was present.
    pub fn remove_element(&mut self, id: &str) -> bool {
        let Some(existing) = self.items.remove(id) else {
            return false;
        };
        self.tree.remove(&existing);
        true
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        self.tree = RTree::new();
        self.items.clear();
    }

    /// Bounds of an indexed element.
    #[must_use]
    pub fn bounds(&self, id: &str) -> Option<Rect> {
        self.items.get(id).map(SpatialItem::rect)
    }

    /// Number of indexed elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of elements whose bounds intersect `area`.
    #[must_use]
    pub fn query(&self, area: Rect) -> Vec<ElementId> {
        self.tree
            .locate_in_envelope_intersecting(&envelope(&area))
            .map(|item| item.id.clone())
            .collect()
    }

    /// Snap a dragged element to the edges of nearby elements.
    ///
    /// Searches `rect` grown by `threshold`. For each neighbour other than
    /// `id`, every edge alignment closer than `threshold` adds a guide and
    /// overwrites the snapped coordinate on its axis, so when several
    /// neighbours match the same axis the last one evaluated wins.
    ///
    /// The basic checks are the four same-edge alignments: left-left and
    /// right-right horizontally, top-top and bottom-bottom vertically.
    /// Each axis also checks two abutting alignments beyond those: dragged
    /// right edge to neighbour left edge and dragged left edge to neighbour
    /// right edge (bottom-to-top and top-to-bottom vertically). The
    /// abutting pairs are required for an element to snap flush against
    /// the side of a neighbour, as in the right-edge-to-left-edge case.
    #[must_use]
    pub fn find_snap_targets(&self, id: &str, rect: Rect, threshold: f32) -> SnapResult {
        let mut snapped_x = rect.x;
        let mut snapped_y = rect.y;
        let mut guides = Vec::new();

        let candidates = self
            .tree
            .locate_in_envelope_intersecting(&envelope(&rect.expand(threshold)));

        for other in candidates {
            if other.id == id {
                continue;
            }

            // (neighbour edge, dragged edge, dragged edge offset from x/y)
            let horizontal = [
                (other.min_x, rect.x, 0.0),
                (other.max_x, rect.max_x(), rect.width),
                (other.min_x, rect.max_x(), rect.width),
                (other.max_x, rect.x, 0.0),
            ];
            for (target, edge, offset) in horizontal {
                if (target - edge).abs() < threshold {
                    snapped_x = target - offset;
                    guides.push(guide(Orientation::Vertical, target));
                }
            }

            let vertical = [
                (other.min_y, rect.y, 0.0),
                (other.max_y, rect.max_y(), rect.height),
                (other.min_y, rect.max_y(), rect.height),
                (other.max_y, rect.y, 0.0),
            ];
            for (target, edge, offset) in vertical {
                if (target - edge).abs() < threshold {
                    snapped_y = target - offset;
                    guides.push(guide(Orientation::Horizontal, target));
                }
            }
        }

        SnapResult {
            x: snapped_x,
            y: snapped_y,
            guides,
        }
    }
}

fn guide(orientation: Orientation, value: f32) -> SnapGuide {
    SnapGuide {
        orientation,
        value,
        label: String::new(),
    }
}
