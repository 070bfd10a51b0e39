//! Versioned binary snapshot of a [`Document`].
//!
//! Layout: 4 byte magic `DSNP`, little-endian `u32` version, then a bincode
//! body. The same bytes are written to disk and sent over the wire.

use crate::document::Document;
use crate::history::Action;
use crate::shapes::{Shape, ShapeId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"DSNP";
pub const SNAPSHOT_VERSION: u32 = 1;
const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + std::mem::size_of::<u32>();

/// Snapshot encoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Not a drawing snapshot")]
    BadMagic,
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
    #[error("Snapshot truncated")]
    Truncated,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Encode error: {0}")]
    Encode(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// On-disk body, version 1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotV1 {
    pub shapes: Vec<(ShapeId, Shape)>,
    pub done: Vec<Action>,
    pub undone: Vec<Action>,
}

impl From<&Document> for SnapshotV1 {
    fn from(doc: &Document) -> Self {
        Self {
            shapes: doc.entries().map(|(id, shape)| (id, shape.clone())).collect(),
            done: doc.done().to_vec(),
            undone: doc.undone().to_vec(),
        }
    }
}

impl From<SnapshotV1> for Document {
    fn from(snapshot: SnapshotV1) -> Self {
        Document::from_parts(snapshot.shapes, snapshot.done, snapshot.undone)
    }
}

/// Encode a document with header.
pub fn encode(doc: &Document) -> CodecResult<Vec<u8>> {
    let body = bincode::serde::encode_to_vec(SnapshotV1::from(doc), bincode::config::standard())
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    let mut payload = Vec::with_capacity(HEADER_LEN + body.len());
    payload.extend_from_slice(&SNAPSHOT_MAGIC);
    payload.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    payload.extend_from_slice(&body);
    Ok(payload)
}

/// Decode a document, checking magic and version first.
pub fn decode(payload: &[u8]) -> CodecResult<Document> {
    if payload.len() < HEADER_LEN {
        return Err(if payload.starts_with(&SNAPSHOT_MAGIC) || SNAPSHOT_MAGIC.starts_with(payload) {
            CodecError::Truncated
        } else {
            CodecError::BadMagic
        });
    }
    if !payload.starts_with(&SNAPSHOT_MAGIC) {
        return Err(CodecError::BadMagic);
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&payload[SNAPSHOT_MAGIC.len()..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    let body = &payload[HEADER_LEN..];

    match version {
        1 => {
            let (snapshot, _): (SnapshotV1, usize) =
                bincode::serde::decode_from_slice(body, bincode::config::standard()).map_err(
                    |e| match e {
                        bincode::error::DecodeError::UnexpectedEnd { .. } => CodecError::Truncated,
                        other => CodecError::Decode(other.to_string()),
                    },
                )?;
            Ok(snapshot.into())
        }
        _ => Err(CodecError::UnsupportedVersion(version)),
    }
}
