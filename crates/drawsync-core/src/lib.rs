//! DrawSync Core Library
//!
//! Shape document with linear undo/redo history, snapshot persistence, and
//! the client side of the relay sync protocol.

pub mod codec;
pub mod document;
pub mod editor;
pub mod endpoint;
pub mod history;
pub mod protocol;
pub mod shapes;
pub mod storage;

pub use codec::{CodecError, SNAPSHOT_VERSION};
pub use document::{Document, DocumentEvent};
pub use editor::{Editor, SyncOutcome};
pub use endpoint::{ConnectionState, Endpoint, EndpointConfig, SyncError};
pub use history::{Action, ActionKind, ChangeKind, HistoryError};
pub use protocol::{HandshakeRequest, ProtocolError};
pub use shapes::{Color, Paint, Shape, ShapeId, ShapeKind};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
