use drawsync_core::protocol::{ACK, BUSY, HandshakeRequest, NAK};
use drawsync_core::{
    Color, Document, Endpoint, EndpointConfig, Paint, ProtocolError, Shape, ShapeKind,
    SyncError,
};
use drawsync_server::{RelayConfig, RelayListener, RelayStore};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

struct Relay {
    listener: Arc<RelayListener>,
    addr: SocketAddr,
    store: Arc<RelayStore>,
}

fn relay_config(store_path: &Path, max_connections: usize) -> RelayConfig {
    RelayConfig {
        bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        store_path: store_path.to_path_buf(),
        max_connections,
        timeout: Duration::from_secs(5),
        ..RelayConfig::default()
    }
}

async fn start_relay(store_path: &Path, max_connections: usize) -> Relay {
    start_relay_with(relay_config(store_path, max_connections)).await
}

async fn start_relay_with(config: RelayConfig) -> Relay {
    let store = Arc::new(RelayStore::open_file(&config.store_path).await.unwrap());
    let listener = Arc::new(RelayListener::bind(&config, store.clone()).await.unwrap());
    let addr = listener.local_addr().unwrap();

    let serving = listener.clone();
    tokio::spawn(async move { serving.serve().await });

    Relay {
        listener,
        addr,
        store,
    }
}

fn drawing(count: usize) -> Document {
    let mut doc = Document::new();
    for i in 0..count as i32 {
        doc.create(Shape::new(
            ShapeKind::Rectangle,
            (i * 10, i * 10),
            (i * 10 + 5, i * 10 + 5),
            Paint::Fill(Color::rgb(i as u8, 0, 0)),
        ));
    }
    doc
}

/// Run a real endpoint against the relay on the blocking pool.
async fn sync_with(addr: SocketAddr, doc: Document) -> Result<Document, SyncError> {
    tokio::task::spawn_blocking(move || {
        let config = EndpointConfig {
            timeout: Duration::from_secs(5),
            ..EndpointConfig::default()
        };
        let mut endpoint = Endpoint::new(&addr.to_string(), "10.0.0.2", config)?;
        endpoint.sync(&doc)
    })
    .await
    .unwrap()
}

async fn send_frame(stream: &mut TcpStream, payload: &[u8]) {
    stream.write_u32(payload.len() as u32).await.unwrap();
    stream.write_all(payload).await.unwrap();
}

async fn wait_for_active(listener: &RelayListener, expected: usize) {
    for _ in 0..200 {
        if listener.active_connections() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} active connections, still {}",
        expected,
        listener.active_connections()
    );
}

#[tokio::test]
async fn test_sync_returns_merged_document() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay(&dir.path().join("relay.dsnap"), 5).await;

    let first = sync_with(relay.addr, drawing(1)).await.unwrap();
    assert_eq!(first.len(), 1);
    assert!(!first.can_redo());

    let second = sync_with(relay.addr, drawing(2)).await.unwrap();
    assert_eq!(second.len(), 3);
    // Stored shapes come first.
    assert_eq!(second.shapes().next(), drawing(1).shapes().next());

    assert_eq!(relay.store.snapshot().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.dsnap");
    {
        let relay = start_relay(&path, 5).await;
        sync_with(relay.addr, drawing(2)).await.unwrap();
    }

    let reopened = RelayStore::open_file(&path).await.unwrap();
    assert_eq!(reopened.snapshot().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_mismatched_sender_gets_no_reply() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay(&dir.path().join("relay.dsnap"), 5).await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    let request = HandshakeRequest::new("10.9.9.9", "10.0.0.2");
    send_frame(&mut stream, &request.encode()).await;
    assert_eq!(stream.read_u8().await.unwrap(), ACK);

    stream.write_u8(ACK).await.unwrap();
    send_frame(&mut stream, &drawing(1).to_bytes().unwrap()).await;

    // Orderly close with nothing further.
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    // The document was still merged.
    assert_eq!(relay.store.snapshot().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_malformed_request_closes_connection() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay(&dir.path().join("relay.dsnap"), 5).await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    send_frame(&mut stream, b"no-space-here").await;

    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
    wait_for_active(&relay.listener, 0).await;
    assert!(relay.store.snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_store_reports_failed_merge() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("relay.dsnap");
    let relay = start_relay(&path, 5).await;
    std::fs::write(&path, b"garbage").unwrap();

    let result = sync_with(relay.addr, drawing(1)).await;
    assert!(matches!(
        result,
        Err(SyncError::Protocol(ProtocolError::RelayFailed))
    ));
    // The broken snapshot is not silently replaced.
    assert_eq!(std::fs::read(&path).unwrap(), b"garbage");
}

#[tokio::test]
async fn test_sixth_connection_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay(&dir.path().join("relay.dsnap"), 5).await;

    // Five idle connections hold every slot.
    let mut idle = Vec::new();
    for _ in 0..5 {
        idle.push(TcpStream::connect(relay.addr).await.unwrap());
    }
    wait_for_active(&relay.listener, 5).await;

    let mut sixth = TcpStream::connect(relay.addr).await.unwrap();
    send_frame(&mut sixth, &HandshakeRequest::new("127.0.0.1", "10.0.0.2").encode()).await;
    assert_eq!(sixth.read_u8().await.unwrap(), BUSY);
    let mut rest = Vec::new();
    assert_eq!(sixth.read_to_end(&mut rest).await.unwrap_or(0), 0);
    assert_eq!(relay.listener.active_connections(), 5);

    // Finishing one connection frees exactly one slot.
    drop(idle.pop());
    wait_for_active(&relay.listener, 4).await;

    let mut admitted = TcpStream::connect(relay.addr).await.unwrap();
    send_frame(&mut admitted, &HandshakeRequest::new("127.0.0.1", "10.0.0.2").encode()).await;
    assert_eq!(admitted.read_u8().await.unwrap(), ACK);
    wait_for_active(&relay.listener, 5).await;

    // Concurrent completions give back every slot, and no more.
    drop(admitted);
    idle.clear();
    wait_for_active(&relay.listener, 0).await;
    assert_eq!(relay.listener.max_connections(), 5);
}

#[tokio::test]
async fn test_endpoint_reports_busy_relay() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay(&dir.path().join("relay.dsnap"), 1).await;

    let _idle = TcpStream::connect(relay.addr).await.unwrap();
    wait_for_active(&relay.listener, 1).await;

    let result = sync_with(relay.addr, drawing(1)).await;
    assert!(matches!(
        result,
        Err(SyncError::Protocol(
            ProtocolError::ServiceUnavailable
        ))
    ));
}

#[tokio::test]
async fn test_undecodable_document_reports_failed_merge() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay(&dir.path().join("relay.dsnap"), 5).await;

    let mut stream = TcpStream::connect(relay.addr).await.unwrap();
    send_frame(&mut stream, &HandshakeRequest::new("127.0.0.1", "10.0.0.2").encode()).await;
    assert_eq!(stream.read_u8().await.unwrap(), ACK);
    stream.write_u8(ACK).await.unwrap();
    send_frame(&mut stream, b"not a snapshot").await;

    assert_eq!(stream.read_u8().await.unwrap(), NAK);
    assert!(relay.store.snapshot().await.unwrap().is_empty());
}

/// Read BUSY and the close that follows it, failing if either takes longer
/// than `within`.
async fn expect_busy_close(stream: &mut TcpStream, within: Duration) {
    tokio::time::timeout(within, async {
        assert_eq!(stream.read_u8().await.unwrap(), BUSY);
        let mut rest = Vec::new();
        assert_eq!(stream.read_to_end(&mut rest).await.unwrap_or(0), 0);
    })
    .await
    .expect("rejected connection was held open");
}

#[tokio::test]
async fn test_silent_connections_over_capacity_are_closed_quickly() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay(&dir.path().join("relay.dsnap"), 1).await;

    let _idle = TcpStream::connect(relay.addr).await.unwrap();
    wait_for_active(&relay.listener, 1).await;

    // None of these ever send a request.
    let mut silent = Vec::new();
    for _ in 0..20 {
        silent.push(TcpStream::connect(relay.addr).await.unwrap());
    }
    for stream in &mut silent {
        expect_busy_close(stream, Duration::from_secs(2)).await;
    }
    assert_eq!(relay.listener.active_connections(), 1);
}

#[tokio::test]
async fn test_rejects_beyond_pending_limit_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let relay = start_relay_with(RelayConfig {
        max_pending_rejects: 1,
        ..relay_config(&dir.path().join("relay.dsnap"), 1)
    })
    .await;

    let _idle = TcpStream::connect(relay.addr).await.unwrap();
    wait_for_active(&relay.listener, 1).await;

    // The first reject keeps its slot while it lingers for the caller to
    // hang up.
    let mut pending = TcpStream::connect(relay.addr).await.unwrap();
    assert_eq!(pending.read_u8().await.unwrap(), BUSY);

    let mut dropped = TcpStream::connect(relay.addr).await.unwrap();
    let mut rest = Vec::new();
    let n = tokio::time::timeout(Duration::from_secs(2), dropped.read_to_end(&mut rest))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);
}
