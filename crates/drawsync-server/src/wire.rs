//! Relay side framing. Every step is bounded by the connection timeout.

use crate::error::{RelayError, RelayResult};
use drawsync_core::protocol::{self, ProtocolError};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub(crate) struct Wire {
    stream: TcpStream,
    timeout: Duration,
    max_frame_len: usize,
}

impl Wire {
    pub(crate) fn new(stream: TcpStream, timeout: Duration, max_frame_len: usize) -> Self {
        Self {
            stream,
            timeout,
            max_frame_len,
        }
    }

    async fn deadline<T, F>(timeout: Duration, step: F) -> RelayResult<T>
    where
        F: Future<Output = std::io::Result<T>>,
    {
        match tokio::time::timeout(timeout, step).await {
            Ok(result) => Ok(result.map_err(ProtocolError::from)?),
            Err(_) => Err(RelayError::Timeout),
        }
    }

    pub(crate) async fn read_frame(&mut self) -> RelayResult<Vec<u8>> {
        let len = Self::deadline(self.timeout, self.stream.read_u32()).await? as usize;
        protocol::check_frame_len(len, self.max_frame_len)?;
        let mut payload = vec![0u8; len];
        Self::deadline(self.timeout, self.stream.read_exact(&mut payload)).await?;
        Ok(payload)
    }

    pub(crate) async fn write_frame(&mut self, payload: &[u8]) -> RelayResult<()> {
        protocol::check_frame_len(payload.len(), self.max_frame_len)?;
        let len = payload.len() as u32;
        Self::deadline(self.timeout, async {
            self.stream.write_all(&len.to_be_bytes()).await?;
            self.stream.write_all(payload).await?;
            self.stream.flush().await
        })
        .await
    }

    pub(crate) async fn read_ack(&mut self) -> RelayResult<()> {
        let byte = Self::deadline(self.timeout, self.stream.read_u8()).await?;
        Ok(protocol::check_ack(byte)?)
    }

    pub(crate) async fn write_byte(&mut self, byte: u8) -> RelayResult<()> {
        Self::deadline(self.timeout, async {
            self.stream.write_all(&[byte]).await?;
            self.stream.flush().await
        })
        .await
    }

    /// Send FIN so the endpoint sees an orderly close.
    pub(crate) async fn close(mut self) {
        let _ = tokio::time::timeout(self.timeout, self.stream.shutdown()).await;
    }

    /// Send FIN, then discard input until the endpoint closes or `linger`
    /// passes. Unread input would otherwise reset the connection before the
    /// endpoint reads the last byte written.
    pub(crate) async fn close_draining(mut self, linger: Duration) {
        let _ = tokio::time::timeout(linger, async {
            self.stream.shutdown().await?;
            tokio::io::copy(&mut self.stream, &mut tokio::io::sink()).await
        })
        .await;
    }
}
