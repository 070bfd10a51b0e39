use drawsync_core::protocol::ProtocolError;
use drawsync_core::storage::StorageError;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Relay errors. Everything except `Bind` is scoped to one connection.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Relay store error: {0}")]
    Storage(#[from] StorageError),
    #[error("Handshake step timed out")]
    Timeout,
}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        RelayError::Protocol(e.into())
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
