//! Test fixtures and fault-injecting implementations for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use lineup::error::{MatchmakingError, Result};
use lineup::matching::{GroupingConfig, MatchingEngine};
use lineup::metrics::MetricsCollector;
use lineup::notify::RecordingPublisher;
use lineup::queue::{InMemoryQueueStore, QueueStore};
use lineup::types::{JoinRequest, WaitingPlayer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Queue store that can be told to fail snapshots or commits
///
/// Everything else is delegated to a real in-memory store, so a test can flip
/// the fault off again and watch the next pass recover.
#[derive(Debug, Default)]
pub struct FaultyQueueStore {
    inner: InMemoryQueueStore,
    fail_peeks: AtomicBool,
    fail_commits: AtomicBool,
    commit_attempts: AtomicUsize,
}

impl FaultyQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_peeks(&self, fail: bool) {
        self.fail_peeks.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of commit calls seen, successful or not
    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.inner.contains(player_id).unwrap_or(false)
    }
}

#[async_trait]
impl QueueStore for FaultyQueueStore {
    async fn enqueue(&self, request: JoinRequest) -> Result<WaitingPlayer> {
        self.inner.enqueue(request).await
    }

    async fn dequeue(&self, player_id: &str) -> Result<bool> {
        self.inner.dequeue(player_id).await
    }

    async fn peek(&self, limit: usize) -> Result<Vec<WaitingPlayer>> {
        if self.fail_peeks.load(Ordering::SeqCst) {
            return Err(MatchmakingError::StorageUnavailable {
                message: "injected snapshot failure".to_string(),
            }
            .into());
        }
        self.inner.peek(limit).await
    }

    async fn commit_match(&self, players: &[WaitingPlayer]) -> Result<()> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(MatchmakingError::StorageUnavailable {
                message: "injected commit failure".to_string(),
            }
            .into());
        }
        self.inner.commit_match(players).await
    }

    async fn queue_size(&self) -> Result<usize> {
        self.inner.queue_size().await
    }
}

/// Build a join request
pub fn join(player_id: &str, mmr: f64) -> JoinRequest {
    JoinRequest {
        player_id: player_id.to_string(),
        mmr,
    }
}

/// Enqueue one player per rating, named `p00`, `p01`, ...
pub async fn seed_players(store: &dyn QueueStore, ratings: &[f64]) {
    for (i, mmr) in ratings.iter().enumerate() {
        store
            .enqueue(join(&format!("p{:02}", i), *mmr))
            .await
            .expect("Failed to seed player");
    }
}

/// Ratings 1000, 1010, ... 1090
pub fn ten_close_ratings() -> Vec<f64> {
    (0..10).map(|i| 1000.0 + i as f64 * 10.0).collect()
}

/// Engine with default grouping over the given store, recording what it publishes
pub fn create_engine(
    store: Arc<dyn QueueStore>,
) -> (MatchingEngine, Arc<RecordingPublisher>, Arc<MetricsCollector>) {
    let publisher = Arc::new(RecordingPublisher::new());
    let metrics = Arc::new(MetricsCollector::new().expect("Failed to create metrics collector"));
    let engine = MatchingEngine::new(
        store,
        publisher.clone(),
        GroupingConfig::default(),
        50,
        metrics.clone(),
    );
    (engine, publisher, metrics)
}

/// Frame opcodes used by the subscriber socket
pub const OPCODE_TEXT: u8 = 0x1;
pub const OPCODE_CLOSE: u8 = 0x8;

/// Bare-bones WebSocket client speaking just enough of RFC 6455 for `/ws`
pub struct WsClient {
    stream: TcpStream,
}

impl WsClient {
    /// Open a connection and complete the upgrade handshake on `path`
    pub async fn connect(addr: SocketAddr, path: &str) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            path, addr
        );
        stream.write_all(request.as_bytes()).await?;

        // Read the response head byte by byte so no frame data is consumed
        let mut head = Vec::new();
        while !head.ends_with(b"\r\n\r\n") {
            head.push(stream.read_u8().await?);
        }
        let head = String::from_utf8_lossy(&head);
        if !head.starts_with("HTTP/1.1 101") {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("upgrade refused: {}", head),
            ));
        }

        Ok(Self { stream })
    }

    /// Read one unfragmented server frame, returning its opcode and payload
    pub async fn read_frame(&mut self) -> std::io::Result<(u8, Vec<u8>)> {
        let first = self.stream.read_u8().await?;
        let second = self.stream.read_u8().await?;

        let len = match second & 0x7f {
            126 => self.stream.read_u16().await? as usize,
            127 => self.stream.read_u64().await? as usize,
            len => len as usize,
        };

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok((first & 0x0f, payload))
    }

    /// Send an empty close frame; client frames must be masked
    pub async fn send_close(&mut self) -> std::io::Result<()> {
        self.stream
            .write_all(&[0x80 | OPCODE_CLOSE, 0x80, 0x12, 0x34, 0x56, 0x78])
            .await
    }
}
