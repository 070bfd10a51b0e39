//! History entries recorded by a [`Document`](crate::Document).

use crate::shapes::{Shape, ShapeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a history entry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Create,
    Edit,
    Delete,
}

/// The kind of edit a caller is reporting through
/// [`Document::modify`](crate::Document::modify).
///
/// Each kind selects the relation used to find the shape as it was before
/// the edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Color,
    Position,
    Size,
    Stroke,
    Delete,
}

impl ChangeKind {
    /// Whether `live` is the pre-edit form of a shape described by `old`.
    pub fn locates(self, live: &Shape, old: &Shape) -> bool {
        match self {
            ChangeKind::Color => live.equal_color(old),
            ChangeKind::Position => live.equal_position(old),
            ChangeKind::Size => live.equal_size(old),
            ChangeKind::Stroke => live.equal_stroke(old),
            ChangeKind::Delete => live.structurally_equal(old),
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChangeKind::Color => "color",
            ChangeKind::Position => "position",
            ChangeKind::Size => "size",
            ChangeKind::Stroke => "stroke",
            ChangeKind::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One recorded step.
///
/// Edits are recorded as two consecutive actions sharing an id: the shape
/// before the edit, then the shape after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Document entry this action refers to.
    pub id: ShapeId,
    /// Snapshot of the shape at the time of the action.
    pub shape: Shape,
    pub kind: ActionKind,
    /// Index the entry occupied in the document.
    pub position: usize,
}

impl Action {
    pub fn new(id: ShapeId, shape: Shape, kind: ActionKind, position: usize) -> Self {
        Self {
            id,
            shape,
            kind,
            position,
        }
    }
}

/// History errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("No shape in the document matches the {change} edit")]
    NoMatch { change: ChangeKind },
}

/// Result type for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::{Color, Paint, ShapeKind};

    #[test]
    fn test_change_kind_selects_relation() {
        let old = Shape::new(ShapeKind::Square, (0, 0), (20, 20), Paint::Fill(Color::black()));
        let moved = old.translated_to(5, 5);

        assert!(ChangeKind::Position.locates(&moved, &old));
        assert!(!ChangeKind::Size.locates(&moved, &old));
        assert!(!ChangeKind::Delete.locates(&moved, &old));
        assert!(ChangeKind::Delete.locates(&old, &old));
    }

    #[test]
    fn test_no_match_message() {
        let err = HistoryError::NoMatch {
            change: ChangeKind::Stroke,
        };
        assert_eq!(err.to_string(), "No shape in the document matches the stroke edit");
    }
}
