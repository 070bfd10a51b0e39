//! Shape kinds.

use serde::{Deserialize, Serialize};

/// The primitive a shape draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Line,
    Triangle {
        /// Drawn with three equal sides inside the drag box.
        equilateral: bool,
    },
    Square,
    Rectangle,
    Ellipse,
    Circle,
    Hexagon,
    Octagon,
    Parallelogram,
    Polygon {
        sides: u32,
    },
}

impl ShapeKind {
    /// Human readable name, as shown in tool tips and logs.
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Line => "Line",
            ShapeKind::Triangle { .. } => "Triangle",
            ShapeKind::Square => "Square",
            ShapeKind::Rectangle => "Rectangle",
            ShapeKind::Ellipse => "Ellipse",
            ShapeKind::Circle => "Circle",
            ShapeKind::Hexagon => "Hexagon",
            ShapeKind::Octagon => "Octagon",
            ShapeKind::Parallelogram => "Parallelogram",
            ShapeKind::Polygon { .. } => "Polygon",
        }
    }

    /// Number of straight edges, `None` for curves and lines.
    pub fn side_count(&self) -> Option<u32> {
        match self {
            ShapeKind::Line | ShapeKind::Ellipse | ShapeKind::Circle => None,
            ShapeKind::Triangle { .. } => Some(3),
            ShapeKind::Square | ShapeKind::Rectangle | ShapeKind::Parallelogram => Some(4),
            ShapeKind::Hexagon => Some(6),
            ShapeKind::Octagon => Some(8),
            ShapeKind::Polygon { sides } => Some(*sides),
        }
    }
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShapeKind::Polygon { sides } => write!(f, "Polygon({sides})"),
            other => f.write_str(other.name()),
        }
    }
}
