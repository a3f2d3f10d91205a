//! Screen geometry: the rectangle a screen occupies in its own coordinates.

use serde::{Deserialize, Serialize};

use crate::domain::screen_graph::Edge;

/// Distance in pixels between an entering edge and the point the cursor
/// lands on, so the landing point does not immediately re-trigger the edge.
pub const ENTRY_INSET: i32 = 1;

/// A screen rectangle in the screen's local coordinate frame.
///
/// `x`/`y` are the top-left origin (usually 0).  The right and bottom bounds
/// are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScreenShape {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenShape {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Clamps a point into the rectangle.
    pub fn clamp(&self, x: i32, y: i32) -> (i32, i32) {
        (
            x.clamp(self.x, (self.right() - 1).max(self.x)),
            y.clamp(self.y, (self.bottom() - 1).max(self.y)),
        )
    }

    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Returns the edge whose jump zone contains `(x, y)`, if any.
    ///
    /// A `zone` of 1 means only the outermost pixel row or column counts.
    /// Left and right are checked before top and bottom, so a corner reports
    /// its horizontal edge.
    pub fn edge_at(&self, x: i32, y: i32, zone: i32) -> Option<Edge> {
        let zone = zone.max(1);
        if x < self.x + zone {
            Some(Edge::Left)
        } else if x >= self.right() - zone {
            Some(Edge::Right)
        } else if y < self.y + zone {
            Some(Edge::Top)
        } else if y >= self.bottom() - zone {
            Some(Edge::Bottom)
        } else {
            None
        }
    }

    /// Returns the edge a point outside the rectangle has run past.
    pub fn crossed_edge(&self, x: i32, y: i32) -> Option<Edge> {
        if x < self.x {
            Some(Edge::Left)
        } else if x >= self.right() {
            Some(Edge::Right)
        } else if y < self.y {
            Some(Edge::Top)
        } else if y >= self.bottom() {
            Some(Edge::Bottom)
        } else {
            None
        }
    }

    /// Landing point when the cursor enters this screen through `edge`.
    ///
    /// `along` is the coordinate parallel to the edge (y for left/right, x for
    /// top/bottom), clamped to this screen's extent.  The perpendicular
    /// coordinate sits [`ENTRY_INSET`] pixels inside the entering edge.
    pub fn entry_point(&self, edge: Edge, along: i32) -> (i32, i32) {
        let (min_x, max_x) = (self.x, (self.right() - 1).max(self.x));
        let (min_y, max_y) = (self.y, (self.bottom() - 1).max(self.y));
        let inset = |lo: i32, hi: i32, from_low: bool| {
            if from_low {
                (lo + ENTRY_INSET).min(hi)
            } else {
                (hi - ENTRY_INSET).max(lo)
            }
        };
        match edge {
            Edge::Left => (inset(min_x, max_x, true), along.clamp(min_y, max_y)),
            Edge::Right => (inset(min_x, max_x, false), along.clamp(min_y, max_y)),
            Edge::Top => (along.clamp(min_x, max_x), inset(min_y, max_y, true)),
            Edge::Bottom => (along.clamp(min_x, max_x), inset(min_y, max_y, false)),
        }
    }
}
