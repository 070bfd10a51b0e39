//! Sync wire protocol shared by the endpoint and the relay.
//!
//! Every variable-length message is a frame: a big-endian `u32` length
//! followed by that many bytes. Acknowledgements are single bytes.
//!
//! ```text
//! endpoint                                relay
//!    | frame("<sender> <destination>")  ->  |
//!    |                                <-  ACK (or BUSY, then close)
//!    | ACK + frame(snapshot)            ->  |
//!    |                                      |  merge into relay store
//!    |           <-  ACK + frame(merged)    |  only if <sender> is the peer
//!    |                                <-  NAK   |  if the merge failed
//! ```

use crate::codec::CodecError;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Acknowledgement byte.
pub const ACK: u8 = 0x01;
/// Sent instead of [`ACK`] when the relay is at capacity.
pub const BUSY: u8 = 0xFF;
/// Sent instead of the merged reply when the relay could not merge.
pub const NAK: u8 = 0xFE;
/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;
/// Default per-step deadline.
pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 10;

/// Protocol errors. All of them end the current connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(io::Error),
    #[error("Timed out waiting for peer")]
    Timeout,
    #[error("Malformed handshake request: {0:?}")]
    MalformedRequest(String),
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("Expected byte {expected:#04x}, got {got:#04x}")]
    UnexpectedByte { expected: u8, got: u8 },
    #[error("Relay is at capacity")]
    ServiceUnavailable,
    #[error("Relay failed to merge the document")]
    RelayFailed,
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error("Snapshot error: {0}")]
    Codec(#[from] CodecError),
}

impl From<io::Error> for ProtocolError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => ProtocolError::Timeout,
            ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
            _ => ProtocolError::Io(e),
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// First frame of every sync: who is asking and for whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Address the sender claims. The merged document is only returned when
    /// this matches the address the relay sees.
    pub sender: String,
    /// Peer the sender wants to sync with.
    pub destination: String,
}

impl HandshakeRequest {
    pub fn new(sender: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            destination: destination.into(),
        }
    }

    /// Parse `"<sender> <destination>"`, splitting on the first space.
    pub fn parse(text: &str) -> ProtocolResult<Self> {
        let malformed = || ProtocolError::MalformedRequest(text.to_string());
        let (sender, destination) = text.split_once(' ').ok_or_else(malformed)?;
        let destination = destination.trim();
        if sender.is_empty() || destination.is_empty() {
            return Err(malformed());
        }
        Ok(Self::new(sender, destination))
    }

    pub fn from_bytes(bytes: &[u8]) -> ProtocolResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::MalformedRequest(String::from_utf8_lossy(bytes).into_owned()))?;
        Self::parse(text)
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{} {}", self.sender, self.destination).into_bytes()
    }

    /// Whether the claimed sender is the peer the relay actually sees.
    pub fn sender_matches(&self, peer: IpAddr) -> bool {
        receiver_matches(&self.sender, peer)
    }
}

/// Compare an address token (`ip` or `ip:port`) against an observed peer
/// address. IPv4-mapped IPv6 addresses compare equal to their IPv4 form.
pub fn receiver_matches(token: &str, peer: IpAddr) -> bool {
    let claimed = token
        .parse::<IpAddr>()
        .ok()
        .or_else(|| token.parse::<SocketAddr>().ok().map(|addr| addr.ip()));
    claimed.is_some_and(|ip| ip.to_canonical() == peer.to_canonical())
}

/// Reject lengths over `max` before allocating.
pub fn check_frame_len(len: usize, max: usize) -> ProtocolResult<()> {
    if len > max {
        return Err(ProtocolError::FrameTooLarge { len, max });
    }
    Ok(())
}

/// Interpret a single status byte.
pub fn check_ack(byte: u8) -> ProtocolResult<()> {
    match byte {
        ACK => Ok(()),
        BUSY => Err(ProtocolError::ServiceUnavailable),
        NAK => Err(ProtocolError::RelayFailed),
        got => Err(ProtocolError::UnexpectedByte { expected: ACK, got }),
    }
}

pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> ProtocolResult<()> {
    check_frame_len(payload.len(), MAX_FRAME_LEN)?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

pub fn read_frame<R: Read>(reader: &mut R, max: usize) -> ProtocolResult<Vec<u8>> {
    let mut len = [0u8; 4];
    reader.read_exact(&mut len)?;
    let len = u32::from_be_bytes(len) as usize;
    check_frame_len(len, max)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

pub fn write_byte<W: Write>(writer: &mut W, byte: u8) -> ProtocolResult<()> {
    writer.write_all(&[byte])?;
    writer.flush()?;
    Ok(())
}

pub fn read_byte<R: Read>(reader: &mut R) -> ProtocolResult<u8> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

/// Read one status byte and require it to be [`ACK`].
pub fn read_ack<R: Read>(reader: &mut R) -> ProtocolResult<()> {
    check_ack(read_byte(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_parse_request() {
        let req = HandshakeRequest::parse("10.0.0.1 10.0.0.2").unwrap();
        assert_eq!(req.sender, "10.0.0.1");
        assert_eq!(req.destination, "10.0.0.2");
        assert_eq!(req.encode(), b"10.0.0.1 10.0.0.2");
    }

    #[test]
    fn test_parse_splits_on_first_space() {
        let req = HandshakeRequest::parse("a b c").unwrap();
        assert_eq!(req.sender, "a");
        assert_eq!(req.destination, "b c");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in ["", "lonely", " 10.0.0.2", "10.0.0.1 ", "10.0.0.1  "] {
            assert!(
                matches!(HandshakeRequest::parse(text), Err(ProtocolError::MalformedRequest(_))),
                "{text:?} should be rejected"
            );
        }
        assert!(HandshakeRequest::from_bytes(&[0xff, 0x20, 0x41]).is_err());
    }

    #[test]
    fn test_receiver_matches() {
        let peer = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7));
        assert!(receiver_matches("192.168.1.7", peer));
        assert!(receiver_matches("192.168.1.7:5000", peer));
        assert!(!receiver_matches("192.168.1.70", peer));
        assert!(!receiver_matches("192.168.1.7x", peer));
        assert!(!receiver_matches("nonsense", peer));

        let mapped = IpAddr::V6(Ipv4Addr::new(192, 168, 1, 7).to_ipv6_mapped());
        assert!(receiver_matches("192.168.1.7", mapped));
        assert!(receiver_matches("::1", IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(receiver_matches("[::1]:80", IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").unwrap();
        assert_eq!(&buf[..4], &5u32.to_be_bytes());

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_frame(&mut cursor, MAX_FRAME_LEN).unwrap(), b"hello");
    }

    #[test]
    fn test_frame_too_large() {
        let mut cursor = Cursor::new(1024u32.to_be_bytes().to_vec());
        assert!(matches!(
            read_frame(&mut cursor, 16),
            Err(ProtocolError::FrameTooLarge { len: 1024, max: 16 })
        ));
    }

    #[test]
    fn test_short_frame_is_connection_closed() {
        let mut bytes = 10u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut cursor = Cursor::new(bytes);
        assert!(matches!(
            read_frame(&mut cursor, MAX_FRAME_LEN),
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_ack_bytes() {
        assert!(read_ack(&mut Cursor::new(vec![ACK])).is_ok());
        assert!(matches!(
            read_ack(&mut Cursor::new(vec![BUSY])),
            Err(ProtocolError::ServiceUnavailable)
        ));
        assert!(matches!(
            read_ack(&mut Cursor::new(vec![NAK])),
            Err(ProtocolError::RelayFailed)
        ));
        assert!(matches!(
            read_ack(&mut Cursor::new(vec![7])),
            Err(ProtocolError::UnexpectedByte { expected: ACK, got: 7 })
        ));
        assert!(matches!(
            read_ack(&mut Cursor::new(Vec::new())),
            Err(ProtocolError::ConnectionClosed)
        ));
    }
}
