//! In-process message bus modeling a WebRTC DataChannel.
//!
//! Peers never hold references to each other; they hold a `PeerId` and
//! reach one another only through a [`MockTransport`] shared by `Arc`. The
//! transport keeps a process-wide registry mapping `PeerId` to whatever
//! implements [`ChunkProvider`] for that peer (its cache lookup), so a
//! request for "grant me this chunk" never needs a live object reference —
//! only an id.

mod messages;
mod room;

pub use messages::{RequestId, TransportMessage, CHUNK_SIZE_BYTES};
pub use room::{ParticipantLink, Room};

use async_trait::async_trait;
use p2psim_types::{PeerId, Resource, ResourceHash};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Heartbeat period / teardown timeout for an idle participant link.
pub const HEARTBEAT_PERIOD_MS: u64 = 5_000;
pub const HEARTBEAT_TIMEOUT_MS: u64 = 15_000;

/// Something that can serve a cached chunk on request. Every peer
/// implements this for itself and registers the implementation with the
/// transport at join time.
#[async_trait]
pub trait ChunkProvider: Send + Sync {
    async fn grant_chunk(&self, hash: ResourceHash) -> Option<Resource>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer does not have the requested resource")]
    PeerMissingResource,
    #[error("failed to reassemble chunks into the original content")]
    ChunkDecodeError,
    #[error("request timed out")]
    Timeout,
    #[error("channel closed (peer disconnected)")]
    ChannelClosed,
}

struct PeerEntry {
    provider: Arc<dyn ChunkProvider>,
    link: ParticipantLink,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl Drop for PeerEntry {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

/// Shared in-process transport. One instance serves an entire simulation
/// run; every peer joins it once and is reachable by `PeerId` thereafter.
pub struct MockTransport {
    peers: RwLock<HashMap<PeerId, PeerEntry>>,
    rooms: RwLock<HashMap<String, Room>>,
    disconnects: broadcast::Sender<PeerId>,
    next_request_id: AtomicU64,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new_raw()
    }
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::new_raw())
    }

    fn new_raw() -> Self {
        let (disconnects, _rx) = broadcast::channel(1024);
        Self {
            peers: RwLock::new(HashMap::new()),
            rooms: RwLock::new(HashMap::new()),
            disconnects,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Join `room`, blocking for this participant's modeled latency before
    /// the endpoint is marked open — mirrors a real DataChannel's
    /// handshake delay.
    pub async fn join(
        self: &Arc<Self>,
        room: &str,
        link: ParticipantLink,
        provider: Arc<dyn ChunkProvider>,
    ) {
        tokio::time::sleep(Duration::from_millis(link.latency_ms)).await;

        {
            let mut rooms = self.rooms.write().await;
            rooms.entry(room.to_string()).or_default().add(link);
        }

        let heartbeat = self.spawn_heartbeat(link.peer_id);
        let mut peers = self.peers.write().await;
        peers.insert(
            link.peer_id,
            PeerEntry {
                provider,
                link,
                heartbeat,
            },
        );
        trace!(peer = %link.peer_id, room, "peer joined transport");
    }

    fn spawn_heartbeat(self: &Arc<Self>, peer_id: PeerId) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut t_ms = 0u64;
            loop {
                tokio::time::sleep(Duration::from_millis(HEARTBEAT_PERIOD_MS)).await;
                t_ms += HEARTBEAT_PERIOD_MS;
                if !this.peers.read().await.contains_key(&peer_id) {
                    return;
                }
                trace!(peer = %peer_id, t_ms, "heartbeat");
            }
        })
    }

    /// Remove a peer from every room it belongs to, deregister its
    /// provider, and fail all requests currently in flight to it with
    /// [`TransportError::ChannelClosed`].
    pub async fn disconnect(&self, peer_id: PeerId) {
        {
            let mut rooms = self.rooms.write().await;
            for room in rooms.values_mut() {
                room.remove(peer_id);
            }
        }
        self.peers.write().await.remove(&peer_id);
        let _ = self.disconnects.send(peer_id);
        debug!(peer = %peer_id, "peer disconnected from transport");
    }

    pub async fn peer_link(&self, peer_id: PeerId) -> Option<ParticipantLink> {
        self.peers.read().await.get(&peer_id).map(|e| e.link)
    }

    pub async fn room(&self, room: &str) -> Option<Room> {
        self.rooms.read().await.get(room).cloned()
    }

    /// Request `hash` from peer `to`, reassembling the chunked response.
    ///
    /// Looks up `to`'s registered [`ChunkProvider`], simulates the chunked
    /// send at that link's latency/bandwidth, and resolves with the
    /// reassembled [`Resource`] or the appropriate [`TransportError`]. A
    /// disconnect of `to` while the transfer is in flight fails the
    /// request with `ChannelClosed` instead of hanging until `timeout_ms`.
    pub async fn request_file(
        self: &Arc<Self>,
        to: PeerId,
        hash: ResourceHash,
        timeout_ms: u64,
    ) -> Result<Resource, TransportError> {
        let mut disconnects = self.disconnects.subscribe();

        tokio::select! {
            result = tokio::time::timeout(Duration::from_millis(timeout_ms), self.transfer_once(to, hash)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(TransportError::Timeout),
                }
            }
            _ = watch_for_disconnect(&mut disconnects, to) => {
                Err(TransportError::ChannelClosed)
            }
        }
    }

    async fn transfer_once(
        self: &Arc<Self>,
        to: PeerId,
        hash: ResourceHash,
    ) -> Result<Resource, TransportError> {
        let (provider, link) = {
            let peers = self.peers.read().await;
            let entry = peers.get(&to).ok_or(TransportError::ChannelClosed)?;
            (Arc::clone(&entry.provider), entry.link)
        };

        let resource = provider
            .grant_chunk(hash)
            .await
            .ok_or(TransportError::PeerMissingResource)?;

        self.simulate_chunked_send(&resource, link).await?;
        Ok(resource)
    }

    /// Simulate the wire cost of shipping a resource already in hand from
    /// `grant_chunk`, without moving bytes a second time: one sleep per
    /// chunk at the per-chunk delay the chunk size, bandwidth and link
    /// latency imply.
    async fn simulate_chunked_send(
        &self,
        resource: &Resource,
        link: ParticipantLink,
    ) -> Result<(), TransportError> {
        if link.bandwidth_mbps <= 0.0 {
            warn!(peer = %link.peer_id, "non-positive bandwidth, treating transfer as failed");
            return Err(TransportError::ChunkDecodeError);
        }

        let byte_length = resource.byte_length();
        let total_chunks = chunk_count(byte_length);
        let per_chunk_delay_ms = (byte_length as f64 * 8.0) / (link.bandwidth_mbps * 1e6) * 1000.0
            / total_chunks as f64
            + link.latency_ms as f64;

        let started = Instant::now();
        for _ in 0..total_chunks {
            tokio::time::sleep(Duration::from_secs_f64(per_chunk_delay_ms / 1000.0)).await;
        }
        trace!(
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            total_chunks,
            "chunked transfer complete"
        );
        Ok(())
    }
}

async fn watch_for_disconnect(rx: &mut broadcast::Receiver<PeerId>, target: PeerId) {
    loop {
        match rx.recv().await {
            Ok(id) if id == target => return,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Closed) => return std::future::pending().await,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }
}

/// Number of 16 KiB chunks `byte_length` bytes split into. A zero-length
/// resource is still one (empty) chunk.
pub fn chunk_count(byte_length: u64) -> u32 {
    if byte_length == 0 {
        1
    } else {
        byte_length.div_ceil(CHUNK_SIZE_BYTES as u64) as u32
    }
}

/// Split content into fixed-size chunks for wire transfer.
pub fn split_into_chunks(content: &[u8]) -> Vec<Vec<u8>> {
    if content.is_empty() {
        return vec![Vec::new()];
    }
    content.chunks(CHUNK_SIZE_BYTES).map(|c| c.to_vec()).collect()
}

/// Reassemble chunks produced by [`split_into_chunks`] back into the
/// original byte buffer.
pub fn reassemble_chunks(chunks: &[Vec<u8>]) -> Vec<u8> {
    chunks.iter().flat_map(|c| c.iter().copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::Mutex;

    struct StaticProvider(Mutex<Option<Resource>>);

    #[async_trait]
    impl ChunkProvider for StaticProvider {
        async fn grant_chunk(&self, _hash: ResourceHash) -> Option<Resource> {
            self.0.lock().await.clone()
        }
    }

    fn link(id: u64, latency_ms: u64, bandwidth_mbps: f64) -> ParticipantLink {
        ParticipantLink {
            peer_id: PeerId::new(id),
            latency_ms,
            bandwidth_mbps,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn request_file_reassembles_resource_on_success() {
        let transport = MockTransport::new();
        let resource = Resource::new(Bytes::from_static(b"hello world"), "text/plain", 0.0);
        let provider = Arc::new(StaticProvider(Mutex::new(Some(resource.clone()))));

        transport.join("swarm", link(1, 5, 10.0), provider).await;

        let hash = p2psim_types::hash_bytes(b"hello world");
        let got = transport.request_file(PeerId::new(1), hash, 3_000).await;
        assert_eq!(got, Ok(resource));
    }

    #[tokio::test(start_paused = true)]
    async fn request_file_fails_when_peer_unknown() {
        let transport = MockTransport::new();
        let hash = p2psim_types::hash_bytes(b"x");
        let got = transport.request_file(PeerId::new(99), hash, 1_000).await;
        assert_eq!(got, Err(TransportError::ChannelClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn request_file_fails_when_provider_lacks_resource() {
        let transport = MockTransport::new();
        let provider = Arc::new(StaticProvider(Mutex::new(None)));
        transport.join("swarm", link(1, 1, 10.0), provider).await;

        let hash = p2psim_types::hash_bytes(b"missing");
        let got = transport.request_file(PeerId::new(1), hash, 1_000).await;
        assert_eq!(got, Err(TransportError::PeerMissingResource));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_fails_in_flight_requests() {
        let transport = MockTransport::new();
        // Large payload over tiny bandwidth so the transfer is still
        // in-flight when we disconnect.
        let resource = Resource::new(
            Bytes::from(vec![0u8; 1024 * 1024]),
            "application/octet-stream",
            0.0,
        );
        let provider = Arc::new(StaticProvider(Mutex::new(Some(resource))));
        transport.join("swarm", link(1, 10, 0.01), provider).await;

        let hash = p2psim_types::hash_bytes(b"irrelevant-for-static-provider");
        let t2 = Arc::clone(&transport);
        let req = tokio::spawn(async move { t2.request_file(PeerId::new(1), hash, 60_000).await });

        tokio::task::yield_now().await;
        transport.disconnect(PeerId::new(1)).await;

        let result = req.await.unwrap();
        assert_eq!(result, Err(TransportError::ChannelClosed));
    }

    #[test]
    fn chunking_round_trips_for_arbitrary_lengths() {
        for len in [
            0usize,
            1,
            CHUNK_SIZE_BYTES - 1,
            CHUNK_SIZE_BYTES,
            CHUNK_SIZE_BYTES + 1,
            CHUNK_SIZE_BYTES * 3 + 7,
        ] {
            let content: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let chunks = split_into_chunks(&content);
            assert_eq!(reassemble_chunks(&chunks), content);
        }
    }

    #[test]
    fn chunk_count_treats_empty_as_one_chunk() {
        assert_eq!(chunk_count(0), 1);
        assert_eq!(chunk_count(CHUNK_SIZE_BYTES as u64), 1);
        assert_eq!(chunk_count(CHUNK_SIZE_BYTES as u64 + 1), 2);
    }
}
