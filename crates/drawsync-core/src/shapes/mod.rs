//! Shape definitions for the drawing surface.
//!
//! A [`Shape`] is a plain value: it has no identity of its own. Documents
//! assign a [`ShapeId`] when a shape is inserted, and the four partial
//! equality relations below are how a caller holding only a value (for
//! example a GUI that kept the shape from before a drag) locates the live
//! entry it is talking about.

mod color;
mod kind;

pub use color::{Color, Paint};
pub use kind::ShapeKind;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for shapes inside a document.
pub type ShapeId = Uuid;

/// Default stroke width for newly drawn shapes.
pub const DEFAULT_STROKE_WIDTH: u32 = 1;

/// One drawable primitive.
///
/// `start` is where the drag began and `end` where it finished; start need
/// not be the top-left corner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub kind: ShapeKind,
    pub start_x: i32,
    pub start_y: i32,
    pub end_x: i32,
    pub end_y: i32,
    pub stroke_width: u32,
    pub paint: Paint,
}

impl Shape {
    /// Create a shape spanning two drag points.
    pub fn new(kind: ShapeKind, start: (i32, i32), end: (i32, i32), paint: Paint) -> Self {
        Self {
            kind,
            start_x: start.0,
            start_y: start.1,
            end_x: end.0,
            end_y: end.1,
            stroke_width: DEFAULT_STROKE_WIDTH,
            paint,
        }
    }

    /// Builder-style stroke width.
    pub fn with_stroke_width(mut self, stroke_width: u32) -> Self {
        self.stroke_width = stroke_width;
        self
    }

    pub fn fill_color(&self) -> Option<Color> {
        self.paint.fill_color()
    }

    pub fn stroke_color(&self) -> Option<Color> {
        self.paint.stroke_color()
    }

    /// Horizontal extent, independent of drag direction.
    pub fn width(&self) -> u32 {
        self.end_x.abs_diff(self.start_x)
    }

    /// Vertical extent, independent of drag direction.
    pub fn height(&self) -> u32 {
        self.end_y.abs_diff(self.start_y)
    }

    /// Move the shape so that it starts at `(x, y)`, keeping its extent.
    /// The end point clamps to the `i32` range.
    pub fn translated_to(&self, x: i32, y: i32) -> Self {
        let shift = |end: i32, from: i32, to: i32| {
            (i64::from(end) + i64::from(to) - i64::from(from))
                .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        };
        Self {
            start_x: x,
            start_y: y,
            end_x: shift(self.end_x, self.start_x, x),
            end_y: shift(self.end_y, self.start_y, y),
            ..self.clone()
        }
    }

    /// Strict bounding-box hit test; points on the border do not hit.
    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        let (min_x, max_x) = (self.start_x.min(self.end_x), self.start_x.max(self.end_x));
        let (min_y, max_y) = (self.start_y.min(self.end_y), self.start_y.max(self.end_y));
        x > min_x && x < max_x && y > min_y && y < max_y
    }

    // The four relations below each compare everything except one group of
    // attributes, so that the same logical shape can be recognised on both
    // sides of an edit to that group.

    /// Equal in everything but paint.
    pub fn equal_color(&self, other: &Shape) -> bool {
        self.stroke_width == other.stroke_width
            && self.kind == other.kind
            && self.start_x == other.start_x
            && self.start_y == other.start_y
            && self.end_x == other.end_x
            && self.end_y == other.end_y
    }

    /// Equal in everything but placement. Width and height must still agree.
    pub fn equal_position(&self, other: &Shape) -> bool {
        self.paint == other.paint
            && self.stroke_width == other.stroke_width
            && self.width() == other.width()
            && self.height() == other.height()
            && self.kind == other.kind
    }

    /// Equal in everything but the end point.
    pub fn equal_size(&self, other: &Shape) -> bool {
        self.paint == other.paint
            && self.stroke_width == other.stroke_width
            && self.kind == other.kind
            && self.start_x == other.start_x
            && self.start_y == other.start_y
    }

    /// Equal in everything but stroke width.
    pub fn equal_stroke(&self, other: &Shape) -> bool {
        self.paint == other.paint
            && self.kind == other.kind
            && self.start_x == other.start_x
            && self.start_y == other.start_y
            && self.end_x == other.end_x
            && self.end_y == other.end_y
    }

    /// At least one relation holds.
    pub fn matches_any(&self, other: &Shape) -> bool {
        self.equal_color(other)
            || self.equal_position(other)
            || self.equal_size(other)
            || self.equal_stroke(other)
    }

    /// All four relations hold.
    pub fn structurally_equal(&self, other: &Shape) -> bool {
        self.equal_color(other)
            && self.equal_position(other)
            && self.equal_size(other)
            && self.equal_stroke(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> Shape {
        Shape::new(
            ShapeKind::Rectangle,
            (10, 10),
            (50, 50),
            Paint::Stroke(Color::black()),
        )
        .with_stroke_width(5)
    }

    #[test]
    fn test_extent_ignores_drag_direction() {
        let s = Shape::new(ShapeKind::Ellipse, (50, 80), (10, 20), Paint::default());
        assert_eq!(s.width(), 40);
        assert_eq!(s.height(), 60);
    }

    #[test]
    fn test_translate_keeps_extent() {
        let moved = rect().translated_to(-30, 100);
        assert_eq!((moved.start_x, moved.start_y), (-30, 100));
        assert_eq!((moved.end_x, moved.end_y), (10, 140));
    }

    #[test]
    fn test_translate_clamps_at_extreme_coordinates() {
        let s = Shape::new(ShapeKind::Rectangle, (i32::MIN, 0), (0, i32::MAX), Paint::default());
        let moved = s.translated_to(i32::MAX, i32::MIN);
        assert_eq!((moved.start_x, moved.start_y), (i32::MAX, i32::MIN));
        assert_eq!(moved.end_x, i32::MAX);
        assert_eq!(moved.end_y, -1);
    }

    #[test]
    fn test_contains_point_is_strict() {
        let s = rect();
        assert!(s.contains_point(20, 20));
        assert!(!s.contains_point(10, 20));
        assert!(!s.contains_point(60, 20));
    }

    #[test]
    fn test_color_change_keeps_only_equal_color() {
        let old = rect();
        let new = Shape {
            paint: Paint::Stroke(Color::rgb(255, 0, 0)),
            ..old.clone()
        };
        assert!(old.equal_color(&new));
        assert!(!old.equal_position(&new));
        assert!(!old.equal_size(&new));
        assert!(!old.equal_stroke(&new));
    }

    #[test]
    fn test_move_keeps_only_equal_position() {
        let old = rect();
        let new = old.translated_to(100, 120);
        assert!(old.equal_position(&new));
        assert!(!old.equal_color(&new));
        assert!(!old.equal_size(&new));
        assert!(!old.equal_stroke(&new));
    }

    #[test]
    fn test_resize_keeps_only_equal_size() {
        let old = rect();
        let new = Shape { end_x: 90, end_y: 70, ..old.clone() };
        assert!(old.equal_size(&new));
        assert!(!old.equal_color(&new));
        assert!(!old.equal_position(&new));
        assert!(!old.equal_stroke(&new));
    }

    #[test]
    fn test_stroke_width_change_keeps_only_equal_stroke() {
        let old = rect();
        let new = old.clone().with_stroke_width(9);
        assert!(old.equal_stroke(&new));
        assert!(!old.equal_color(&new));
        assert!(!old.equal_position(&new));
        assert!(!old.equal_size(&new));
    }

    #[test]
    fn test_fill_and_stroke_never_match_on_paint() {
        let stroked = rect();
        let filled = Shape {
            paint: Paint::Fill(Color::black()),
            ..stroked.clone()
        };
        assert!(stroked.equal_color(&filled));
        assert!(!stroked.equal_stroke(&filled));
        assert!(!stroked.structurally_equal(&filled));
    }

    #[test]
    fn test_identical_shapes_are_indistinguishable() {
        // Two separately drawn but identical shapes satisfy every relation;
        // only a document id can tell them apart.
        let a = rect();
        let b = rect();
        assert!(a.structurally_equal(&b));
        assert!(a.matches_any(&b));
    }

    #[test]
    fn test_unrelated_shapes_match_nothing() {
        let a = rect();
        let b = Shape::new(ShapeKind::Circle, (0, 0), (5, 5), Paint::Fill(Color::white()));
        assert!(!a.matches_any(&b));
    }
}
