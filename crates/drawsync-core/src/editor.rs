//! Editor state: the document being edited plus its sync endpoint.
//!
//! This is the surface a GUI drives. Every call is synchronous; `sync` blocks
//! for at most a few endpoint timeouts.

use crate::document::{Document, DocumentEvent};
use crate::endpoint::{ConnectionState, Endpoint, EndpointConfig, SyncError, SyncResult};
use crate::history::{ChangeKind, HistoryError, HistoryResult};
use crate::shapes::{Shape, ShapeId};
use crate::storage::{self, StorageResult};
use std::path::Path;
use std::sync::mpsc::Receiver;

/// What a sync did to the local document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The merged document replaced the local shapes.
    Replaced { shapes: usize },
    /// Nothing usable came back; the local document is untouched.
    Unchanged,
}

/// The editing session.
#[derive(Debug, Default)]
pub struct Editor {
    /// The document being edited.
    pub document: Document,
    /// Currently selected shape.
    selection: Option<ShapeId>,
    endpoint: Option<Endpoint>,
    endpoint_config: EndpointConfig,
}

impl Editor {
    /// Create an editor with an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an editor with an existing document.
    pub fn with_document(document: Document) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    /// Override the timeouts used by future connections.
    pub fn with_endpoint_config(mut self, config: EndpointConfig) -> Self {
        self.endpoint_config = config;
        self
    }

    pub fn subscribe(&mut self) -> Receiver<DocumentEvent> {
        self.document.subscribe()
    }

    pub fn create_shape(&mut self, shape: Shape) -> ShapeId {
        self.document.create(shape)
    }

    pub fn modify(
        &mut self,
        new_shape: Shape,
        old_shape: &Shape,
        change: ChangeKind,
    ) -> HistoryResult<()> {
        self.document.modify(new_shape, Some(old_shape), change)
    }

    /// Remove a shape and record the removal so it can be undone.
    pub fn delete(&mut self, shape: &Shape) -> HistoryResult<()> {
        let Some(id) = self.document.delete(shape) else {
            return Err(HistoryError::NoMatch {
                change: ChangeKind::Delete,
            });
        };
        if self.selection == Some(id) {
            self.selection = None;
        }
        self.document
            .modify(shape.clone(), None, ChangeKind::Delete)
    }

    pub fn undo(&mut self) -> bool {
        self.document.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.document.redo()
    }

    pub fn can_redo(&self) -> bool {
        self.document.can_redo()
    }

    pub fn clear(&mut self) {
        self.selection = None;
        self.document.clear();
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.document.shapes()
    }

    /// Select the first shape under the point, or clear the selection.
    pub fn select_shape(&mut self, x: i32, y: i32) -> Option<&Shape> {
        self.selection = self.document.shape_at(x, y).map(|(id, _)| id);
        self.selected()
    }

    /// Selected shape, if it still exists.
    pub fn selected(&self) -> Option<&Shape> {
        self.selection.and_then(|id| self.document.get(id))
    }

    /// Write the document, history included, to `path`.
    pub fn save(&self, path: &Path) -> StorageResult<()> {
        storage::write_snapshot(path, &self.document).inspect_err(|e| {
            log::error!("Failed to save {}: {}", path.display(), e);
        })?;
        log::info!("Saved {} shapes to {}", self.document.len(), path.display());
        Ok(())
    }

    /// Replace the document with the one stored at `path`.
    ///
    /// On failure the current document is kept.
    pub fn load(&mut self, path: &Path) -> StorageResult<()> {
        let loaded = storage::read_snapshot(path).inspect_err(|e| {
            log::error!("Failed to load {}: {}", path.display(), e);
        })?;
        log::info!("Loaded {} shapes from {}", loaded.len(), path.display());
        self.selection = None;
        self.document.replace_with(loaded);
        Ok(())
    }

    /// Bind to a relay for syncing with `peer`. Replaces any previous binding.
    pub fn connect(&mut self, relay: &str, peer: &str) -> SyncResult<()> {
        let endpoint = Endpoint::new(relay, peer, self.endpoint_config.clone())?;
        self.endpoint = Some(endpoint);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            log::info!("Disconnected from relay {}", endpoint.relay_addr());
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.endpoint
            .as_ref()
            .map_or(ConnectionState::Disconnected, Endpoint::state)
    }

    /// Exchange the document with the relay.
    ///
    /// A non-empty merged result becomes the new document with fresh
    /// history. Errors and empty results leave the document as it was.
    pub fn sync(&mut self) -> SyncResult<SyncOutcome> {
        let endpoint = self.endpoint.as_mut().ok_or(SyncError::NotConnected)?;
        let merged = match endpoint.sync(&self.document) {
            Ok(merged) => merged,
            Err(SyncError::NoReply) => {
                log::info!("Relay kept the document without replying");
                return Ok(SyncOutcome::Unchanged);
            }
            Err(e) => return Err(e),
        };

        if merged.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }
        let shapes = merged.len();
        self.selection = None;
        self.document.adopt_shapes(merged);
        Ok(SyncOutcome::Replaced { shapes })
    }
}
