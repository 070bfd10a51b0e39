//! Client side of the sync protocol.
//!
//! An [`Endpoint`] is bound to one relay and one destination peer. Each call
//! to [`Endpoint::sync`] opens a fresh TCP connection, runs one handshake and
//! closes it again; no socket is held between syncs.

use crate::document::Document;
use crate::protocol::{
    self, ACK, DEFAULT_SYNC_TIMEOUT_SECS, HandshakeRequest, MAX_FRAME_LEN, ProtocolError,
};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Sync errors surfaced to the editor.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Not connected to a relay")]
    NotConnected,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Relay closed the connection without returning a document")]
    NoReply,
}

impl From<io::Error> for SyncError {
    fn from(e: io::Error) -> Self {
        SyncError::Protocol(e.into())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Endpoint tuning.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Deadline for connecting and for every individual read or write.
    pub timeout: Duration,
    /// Largest merged snapshot accepted from the relay.
    pub max_frame_len: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// A reusable handle for syncing with one peer through one relay.
#[derive(Debug)]
pub struct Endpoint {
    relay: SocketAddr,
    peer: String,
    config: EndpointConfig,
    state: ConnectionState,
}

impl Endpoint {
    /// Resolve the relay address and validate the peer token.
    ///
    /// No connection is made until [`Endpoint::sync`].
    pub fn new(relay: &str, peer: &str, config: EndpointConfig) -> SyncResult<Self> {
        let relay_addr = relay
            .to_socket_addrs()
            .map_err(|e| SyncError::InvalidAddress(format!("{relay}: {e}")))?
            .next()
            .ok_or_else(|| SyncError::InvalidAddress(relay.to_string()))?;

        let peer = peer.trim();
        if peer.is_empty() || peer.contains(char::is_whitespace) {
            return Err(SyncError::InvalidAddress(peer.to_string()));
        }

        log::info!("Sync endpoint bound to relay {} for peer {}", relay_addr, peer);
        Ok(Self {
            relay: relay_addr,
            peer: peer.to_string(),
            config,
            state: ConnectionState::Disconnected,
        })
    }

    pub fn relay_addr(&self) -> SocketAddr {
        self.relay
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// State after the most recent sync attempt.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Send `document` to the relay and return the merged document.
    pub fn sync(&mut self, document: &Document) -> SyncResult<Document> {
        self.state = ConnectionState::Connecting;
        let result = self.exchange(document);
        self.state = match &result {
            Ok(_) | Err(SyncError::NoReply) => ConnectionState::Connected,
            Err(_) => ConnectionState::Error,
        };
        match &result {
            Ok(merged) => log::info!("Sync with {} returned {} shapes", self.relay, merged.len()),
            Err(e) => log::warn!("Sync with {} failed: {}", self.relay, e),
        }
        result
    }

    fn exchange(&self, document: &Document) -> SyncResult<Document> {
        let timeout = self.config.timeout;
        let mut stream = TcpStream::connect_timeout(&self.relay, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;

        let sender = stream.local_addr()?.ip().to_canonical();
        let request = HandshakeRequest::new(sender.to_string(), self.peer.as_str());
        log::debug!("Handshake {} -> {}", request.sender, request.destination);
        protocol::write_frame(&mut stream, &request.encode())?;
        protocol::read_ack(&mut stream)?;

        let payload = document.to_bytes().map_err(ProtocolError::from)?;
        protocol::write_byte(&mut stream, ACK)?;
        protocol::write_frame(&mut stream, &payload)?;
        log::debug!("Sent {} byte snapshot", payload.len());

        match protocol::read_byte(&mut stream) {
            Ok(byte) => protocol::check_ack(byte)?,
            Err(ProtocolError::ConnectionClosed) => return Err(SyncError::NoReply),
            Err(e) => return Err(e.into()),
        }
        let merged = protocol::read_frame(&mut stream, self.config.max_frame_len)?;
        Ok(Document::from_bytes(&merged).map_err(ProtocolError::from)?)
    }
}
