//! Relay configuration.

use drawsync_core::protocol::{DEFAULT_SYNC_TIMEOUT_SECS, MAX_FRAME_LEN};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Concurrent connections served before new ones get `BUSY`.
pub const DEFAULT_MAX_CONNECTIONS: usize = 5;
/// Over-capacity connections being turned away at once before further ones
/// are dropped without a reply.
pub const DEFAULT_MAX_PENDING_REJECTS: usize = 32;
/// Snapshot file used when none is given.
pub const DEFAULT_STORE_FILE: &str = "relay_snapshot.dsnap";

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Snapshot file holding the merged document.
    pub store_path: PathBuf,
    pub max_connections: usize,
    pub max_pending_rejects: usize,
    /// Deadline for every read or write of a handshake.
    pub timeout: Duration,
    pub max_frame_len: usize,
}

impl RelayConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            store_path: PathBuf::from(DEFAULT_STORE_FILE),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_pending_rejects: DEFAULT_MAX_PENDING_REJECTS,
            timeout: Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}
