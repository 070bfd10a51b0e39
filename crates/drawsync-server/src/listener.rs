//! Accept loop, admission control and the relay half of the handshake.

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::store::RelayStore;
use crate::wire::Wire;
use drawsync_core::Document;
use drawsync_core::protocol::{ACK, BUSY, HandshakeRequest, NAK, ProtocolError};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Write deadline and linger for turning away an over-capacity caller.
const REJECT_TIMEOUT: Duration = Duration::from_millis(500);
/// Pause after an accept error that is not specific to one connection.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// How a served connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// The merged document was sent back.
    Replied { shapes: usize },
    /// The sender did not match the peer address; nothing was sent back.
    Withheld,
}

#[derive(Clone, Copy)]
struct Limits {
    timeout: Duration,
    max_frame_len: usize,
}

/// TCP listener that merges every incoming document into one [`RelayStore`].
pub struct RelayListener {
    listener: TcpListener,
    store: Arc<RelayStore>,
    permits: Arc<Semaphore>,
    reject_permits: Arc<Semaphore>,
    max_connections: usize,
    limits: Limits,
}

impl RelayListener {
    /// Bind to the configured address.
    pub async fn bind(config: &RelayConfig, store: Arc<RelayStore>) -> RelayResult<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| RelayError::Bind { addr, source })?;
        let max_connections = config.max_connections.max(1);

        Ok(Self {
            listener,
            store,
            permits: Arc::new(Semaphore::new(max_connections)),
            reject_permits: Arc::new(Semaphore::new(config.max_pending_rejects)),
            max_connections,
            limits: Limits {
                timeout: config.timeout,
                max_frame_len: config.max_frame_len,
            },
        })
    }

    pub fn local_addr(&self) -> RelayResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Connections currently holding an admission slot.
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.permits.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Serve until the process is killed.
    pub async fn serve(&self) -> RelayResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. In-flight connections finish on
    /// their own tasks.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> RelayResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.dispatch(stream, peer),
                    Err(e) if is_connection_error(&e) => debug!("Accept failed: {}", e),
                    Err(e) => {
                        warn!("Accept failed: {}, retrying in {:?}", e, ACCEPT_ERROR_BACKOFF);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let conn_id = Uuid::new_v4();
        let span = info_span!("connection", id = %conn_id, %peer);
        let limits = self.limits;

        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            match self.reject_permits.clone().try_acquire_owned() {
                Ok(reject_permit) => {
                    span.in_scope(|| {
                        warn!(
                            "At capacity ({} connections), rejecting",
                            self.max_connections
                        )
                    });
                    tokio::spawn(
                        async move {
                            let _reject_permit = reject_permit;
                            reject(stream, limits).await
                        }
                        .instrument(span),
                    );
                }
                Err(_) => span.in_scope(|| {
                    warn!("At capacity with too many pending rejects, dropping connection")
                }),
            }
            return;
        };

        let store = self.store.clone();
        tokio::spawn(
            async move {
                // Released when the task ends, whichever way it ends.
                let _permit = permit;
                info!("New connection");
                match serve_connection(stream, peer, &store, limits).await {
                    Ok(Exchange::Replied { shapes }) => {
                        info!(shapes, "Sync complete, merged document returned")
                    }
                    Ok(Exchange::Withheld) => {
                        info!("Sync complete, sender did not match peer; no reply")
                    }
                    Err(e) => warn!("Connection failed: {}", e),
                }
            }
            .instrument(span),
        );
    }
}

/// Errors that concern only the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Tell a caller over capacity that the relay is busy, without waiting for
/// its request.
async fn reject(stream: TcpStream, limits: Limits) {
    let mut wire = Wire::new(stream, REJECT_TIMEOUT, limits.max_frame_len);
    match wire.write_byte(BUSY).await {
        Ok(()) => wire.close_draining(REJECT_TIMEOUT).await,
        Err(e) => debug!("Could not send BUSY: {}", e),
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: &RelayStore,
    limits: Limits,
) -> RelayResult<Exchange> {
    let mut wire = Wire::new(stream, limits.timeout, limits.max_frame_len);

    let request = HandshakeRequest::from_bytes(&wire.read_frame().await?)?;
    debug!(sender = %request.sender, destination = %request.destination, "Handshake");
    wire.write_byte(ACK).await?;

    wire.read_ack().await?;
    let payload = wire.read_frame().await?;
    let merged = match merge_payload(&payload, store).await {
        Ok(merged) => merged,
        Err(e) => {
            if let Err(nak) = wire.write_byte(NAK).await {
                debug!("Could not send NAK: {}", nak);
            }
            wire.close().await;
            return Err(e);
        }
    };

    let exchange = if request.sender_matches(peer.ip()) {
        let bytes = merged.to_bytes().map_err(ProtocolError::from)?;
        wire.write_byte(ACK).await?;
        wire.write_frame(&bytes).await?;
        Exchange::Replied {
            shapes: merged.len(),
        }
    } else {
        Exchange::Withheld
    };
    wire.close().await;
    Ok(exchange)
}

async fn merge_payload(payload: &[u8], store: &RelayStore) -> RelayResult<Document> {
    let incoming = Document::from_bytes(payload).map_err(ProtocolError::from)?;
    debug!(shapes = incoming.len(), "Received document");
    store.merge_incoming(&incoming).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_retry_immediately() {
        for kind in [
            io::ErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionAborted,
            io::ErrorKind::ConnectionReset,
        ] {
            assert!(is_connection_error(&io::Error::from(kind)));
        }
    }

    #[test]
    fn test_resource_errors_back_off() {
        // EMFILE and friends surface as uncategorized OS errors.
        assert!(!is_connection_error(&io::Error::from_raw_os_error(24)));
        assert!(!is_connection_error(&io::Error::from(io::ErrorKind::OutOfMemory)));
    }
}
