//! Shape document and its edit history.
//!
//! Shapes live in creation order. Every entry gets a [`ShapeId`] when it is
//! inserted; history entries refer to that id, so undo and redo never have to
//! guess which shape an action was about. Value-based lookups (the four
//! relations on [`Shape`]) are only used where a caller describes a shape by
//! value: [`Document::delete`] and [`Document::modify`].

use crate::codec::{self, CodecResult};
use crate::history::{Action, ActionKind, ChangeKind, HistoryError, HistoryResult};
use crate::shapes::{Shape, ShapeId};
use std::collections::HashSet;
use std::sync::mpsc::{Receiver, Sender, channel};
use uuid::Uuid;

/// Notification sent to subscribers after every completed mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// Shapes or history changed.
    Changed {
        shapes: usize,
        can_undo: bool,
        can_redo: bool,
    },
    /// Everything was cleared.
    Cleared,
    /// The whole content was swapped out (load or sync).
    Replaced { shapes: usize },
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    id: ShapeId,
    shape: Shape,
}

/// An ordered collection of shapes plus linear undo/redo history.
#[derive(Debug, Default)]
pub struct Document {
    entries: Vec<Entry>,
    /// Performed actions, most recent last.
    done: Vec<Action>,
    /// Undone actions, most recently undone last.
    undone: Vec<Action>,
    /// The entry removed by the last `delete`, waiting for its history record.
    pending_removal: Option<Action>,
    subscribers: Vec<Sender<DocumentEvent>>,
}

impl Clone for Document {
    /// Clones content and history. Subscribers stay with the original.
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            done: self.done.clone(),
            undone: self.undone.clone(),
            pending_removal: self.pending_removal.clone(),
            subscribers: Vec::new(),
        }
    }
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a document from decoded parts. Duplicate ids are regenerated.
    pub(crate) fn from_parts(
        shapes: Vec<(ShapeId, Shape)>,
        done: Vec<Action>,
        undone: Vec<Action>,
    ) -> Self {
        let mut seen = HashSet::with_capacity(shapes.len());
        let entries = shapes
            .into_iter()
            .map(|(id, shape)| {
                let id = if seen.insert(id) { id } else { fresh_id(&mut seen) };
                Entry { id, shape }
            })
            .collect();
        Self {
            entries,
            done,
            undone,
            pending_removal: None,
            subscribers: Vec::new(),
        }
    }

    /// Register for change notifications.
    pub fn subscribe(&mut self) -> Receiver<DocumentEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    fn emit(&mut self, event: DocumentEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn notify(&mut self) {
        let event = DocumentEvent::Changed {
            shapes: self.entries.len(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        };
        self.emit(event);
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the number of shapes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Shapes in creation order.
    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.entries.iter().map(|e| &e.shape)
    }

    /// Ids and shapes in creation order.
    pub fn entries(&self) -> impl Iterator<Item = (ShapeId, &Shape)> {
        self.entries.iter().map(|e| (e.id, &e.shape))
    }

    /// Entry ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = ShapeId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// Get a shape by ID.
    pub fn get(&self, id: ShapeId) -> Option<&Shape> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.shape)
    }

    pub fn position_of(&self, id: ShapeId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    /// First shape whose bounding box strictly contains the point.
    pub fn shape_at(&self, x: i32, y: i32) -> Option<(ShapeId, &Shape)> {
        self.entries
            .iter()
            .find(|e| e.shape.contains_point(x, y))
            .map(|e| (e.id, &e.shape))
    }

    /// Performed actions, most recent last.
    pub fn done(&self) -> &[Action] {
        &self.done
    }

    /// Undone actions, next to redo last.
    pub fn undone(&self) -> &[Action] {
        &self.undone
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    /// Shape of the action that the next redo would replay.
    pub fn last_undone(&self) -> Option<&Shape> {
        self.undone.last().map(|a| &a.shape)
    }

    // ------------------------------------------------------------------
    // Entry plumbing
    // ------------------------------------------------------------------

    fn remove_entry(&mut self, id: ShapeId) -> Option<(usize, Shape)> {
        let position = self.position_of(id)?;
        let entry = self.entries.remove(position);
        Some((position, entry.shape))
    }

    /// Insert at `position`, or at the end if the document has shrunk since.
    fn insert_entry(&mut self, position: usize, id: ShapeId, shape: Shape) -> usize {
        let position = position.min(self.entries.len());
        self.entries.insert(position, Entry { id, shape });
        position
    }

    /// Re-insert an entry unless one with the same id is still present.
    fn restore_entry(&mut self, action: &mut Action) {
        if self.position_of(action.id).is_some() {
            log::warn!("shape {} is already present; not restoring a second copy", action.id);
            return;
        }
        action.position = self.insert_entry(action.position, action.id, action.shape.clone());
    }

    /// Remove the entry an action refers to, refreshing the action from it.
    fn take_entry(&mut self, action: &mut Action, step: &str) {
        match self.remove_entry(action.id) {
            Some((position, live)) => {
                action.position = position;
                action.shape = live;
            }
            None => log::warn!("{step}: shape {} is not in the document", action.id),
        }
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append a shape and record its creation.
    pub fn create(&mut self, shape: Shape) -> ShapeId {
        let id = Uuid::new_v4();
        let position = self.entries.len();
        self.entries.push(Entry {
            id,
            shape: shape.clone(),
        });
        self.done
            .push(Action::new(id, shape, ActionKind::Create, position));
        self.undone.clear();
        self.notify();
        id
    }

    /// Remove the first shape structurally equal to `shape`.
    ///
    /// This records nothing. Callers follow up with
    /// `modify(shape, None, ChangeKind::Delete)` to make the removal undoable.
    pub fn delete(&mut self, shape: &Shape) -> Option<ShapeId> {
        let Some(position) = self
            .entries
            .iter()
            .position(|e| e.shape.structurally_equal(shape))
        else {
            log::warn!("delete: no {} matches the selection", shape.kind);
            return None;
        };
        let entry = self.entries.remove(position);
        let id = entry.id;
        self.pending_removal = Some(Action::new(id, entry.shape, ActionKind::Delete, position));
        self.undone.clear();
        self.notify();
        Some(id)
    }

    /// Record an edit of an existing shape.
    ///
    /// For every kind except [`ChangeKind::Delete`] the first entry equal to
    /// `old_shape` is replaced by `new_shape`, falling back to the first entry
    /// matching it under the kind's relation, and
    /// the before/after pair is pushed onto the history. For
    /// [`ChangeKind::Delete`] the removal done by [`Document::delete`] is
    /// recorded; `old_shape` is ignored.
    pub fn modify(
        &mut self,
        new_shape: Shape,
        old_shape: Option<&Shape>,
        change: ChangeKind,
    ) -> HistoryResult<()> {
        if change == ChangeKind::Delete {
            return self.record_delete(new_shape);
        }

        // An untouched entry equal to `old_shape` wins over the relaxed match,
        // so that twins differing only in the edited attributes stay apart.
        let Some(position) = old_shape.and_then(|old| {
            self.entries
                .iter()
                .position(|e| e.shape.structurally_equal(old))
                .or_else(|| {
                    self.entries
                        .iter()
                        .position(|e| change.locates(&e.shape, old))
                })
        }) else {
            log::warn!("{change} edit did not match any shape; history left unchanged");
            return Err(HistoryError::NoMatch { change });
        };

        let id = self.entries[position].id;
        let before = std::mem::replace(&mut self.entries[position].shape, new_shape.clone());
        self.done
            .push(Action::new(id, before, ActionKind::Edit, position));
        self.done
            .push(Action::new(id, new_shape, ActionKind::Edit, position));
        self.undone.clear();
        self.notify();
        Ok(())
    }

    fn record_delete(&mut self, shape: Shape) -> HistoryResult<()> {
        let action = match self.pending_removal.take() {
            Some(removed) if removed.shape.structurally_equal(&shape) => removed,
            _ => {
                if let Some(position) = self
                    .entries
                    .iter()
                    .position(|e| e.shape.structurally_equal(&shape))
                {
                    let entry = &self.entries[position];
                    Action::new(entry.id, entry.shape.clone(), ActionKind::Delete, position)
                } else if self.entries.is_empty() {
                    Action::new(Uuid::new_v4(), shape, ActionKind::Delete, 0)
                } else {
                    log::warn!("delete record did not match any removed shape");
                    return Err(HistoryError::NoMatch {
                        change: ChangeKind::Delete,
                    });
                }
            }
        };
        self.done.push(action);
        self.undone.clear();
        self.notify();
        Ok(())
    }

    /// Undo the last action.
    /// Returns true if undo was performed, false if nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(mut action) = self.done.pop() else {
            return false;
        };

        match action.kind {
            ActionKind::Create => {
                self.take_entry(&mut action, "undo create");
                self.undone.push(action);
            }
            ActionKind::Edit => {
                // `action` is the after-edit half of the pair.
                self.take_entry(&mut action, "undo edit");
                let previous = self
                    .done
                    .last()
                    .filter(|prev| prev.id == action.id)
                    .map(|prev| prev.kind);
                match previous {
                    Some(ActionKind::Create) => {
                        // An edit with no before-half folds into the creation.
                        self.done.pop();
                        let created = Action {
                            kind: ActionKind::Create,
                            ..action.clone()
                        };
                        self.undone.push(action);
                        self.undone.push(created);
                    }
                    Some(ActionKind::Edit) => {
                        if let Some(mut before) = self.done.pop() {
                            before.position =
                                self.insert_entry(action.position, before.id, before.shape.clone());
                            self.undone.push(action);
                            self.undone.push(before);
                        }
                    }
                    _ => {
                        log::warn!("undo edit: no before-state recorded for {}", action.id);
                        self.undone.push(action);
                    }
                }
            }
            ActionKind::Delete => {
                self.restore_entry(&mut action);
                self.undone.push(action);
            }
        }

        self.notify();
        true
    }

    /// Redo the last undone action.
    /// Returns true if redo was performed, false if nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(mut action) = self.undone.pop() else {
            return false;
        };

        match action.kind {
            ActionKind::Create => {
                self.restore_entry(&mut action);
                self.done.push(action);
            }
            ActionKind::Delete => {
                self.take_entry(&mut action, "redo delete");
                self.done.push(action);
            }
            ActionKind::Edit => {
                // `action` is the before-half; its partner sits below it.
                let paired = self
                    .undone
                    .last()
                    .is_some_and(|next| next.kind == ActionKind::Edit && next.id == action.id);
                if paired {
                    if let Some(mut after) = self.undone.pop() {
                        let position = match self.remove_entry(action.id) {
                            Some((position, _)) => position,
                            None => {
                                log::warn!("redo edit: shape {} is not in the document", action.id);
                                action.position
                            }
                        };
                        after.position = self.insert_entry(position, after.id, after.shape.clone());
                        self.done.push(action);
                        self.done.push(after);
                    }
                } else {
                    match self.position_of(action.id) {
                        Some(position) => self.entries[position].shape = action.shape.clone(),
                        None => {
                            action.position =
                                self.insert_entry(action.position, action.id, action.shape.clone());
                        }
                    }
                    self.done.push(action);
                }
            }
        }

        self.notify();
        true
    }

    /// Drop all redo states.
    pub fn clear_redo(&mut self) {
        if !self.undone.is_empty() {
            self.undone.clear();
            self.notify();
        }
    }

    /// Clear all shapes and history.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.done.clear();
        self.undone.clear();
        self.pending_removal = None;
        self.emit(DocumentEvent::Cleared);
    }

    /// Append all shapes of `other`, in order, without recording history.
    ///
    /// Ids already used by this document are regenerated so every entry keeps
    /// a unique id.
    pub fn merge(&mut self, other: &Document) {
        let mut seen: HashSet<ShapeId> = self.entries.iter().map(|e| e.id).collect();
        for entry in &other.entries {
            let id = if seen.insert(entry.id) {
                entry.id
            } else {
                fresh_id(&mut seen)
            };
            self.entries.push(Entry {
                id,
                shape: entry.shape.clone(),
            });
        }
        self.undone.clear();
        self.notify();
    }

    /// Replace content and history with `other`'s, keeping subscribers.
    pub fn replace_with(&mut self, other: Document) {
        self.entries = other.entries;
        self.done = other.done;
        self.undone = other.undone;
        self.pending_removal = None;
        self.emit(DocumentEvent::Replaced {
            shapes: self.entries.len(),
        });
    }

    /// Take over `other`'s shapes as a new baseline with empty history.
    pub fn adopt_shapes(&mut self, other: Document) {
        self.entries = other.entries;
        self.done.clear();
        self.undone.clear();
        self.pending_removal = None;
        self.emit(DocumentEvent::Replaced {
            shapes: self.entries.len(),
        });
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Encode as a versioned binary snapshot.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        codec::encode(self)
    }

    /// Decode a versioned binary snapshot.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        codec::decode(bytes)
    }

    /// Serialize the document to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&codec::SnapshotV1::from(self))
    }

    /// Deserialize a document from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<codec::SnapshotV1>(json).map(Document::from)
    }
}

fn fresh_id(seen: &mut HashSet<ShapeId>) -> ShapeId {
    loop {
        let id = Uuid::new_v4();
        if seen.insert(id) {
            return id;
        }
    }
}
