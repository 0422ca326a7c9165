//! The virtual peer: per-peer cache, reputation-ordered peer/chunk
//! indices, role hysteresis, and the central local-cache -> peer ->
//! origin request pipeline.
//!
//! A peer never holds a reference to another peer. Cross-peer state lives
//! in value-copy [`PeerInfo`] snapshots (`peer_index`) and `PeerId`-keyed
//! reputation queues (`chunk_index`); crediting or penalizing a remote
//! peer goes through [`registry::PeerRegistry`], a process-wide lookup by
//! id, matching the source's "peers interact only through the mock
//! transport, indexed by id" design.

mod config;
mod registry;

pub use config::{
    ReputationWeights, DEFAULT_ROLE_UPDATE_INTERVAL_MS, MAX_RETRIES, NEIGHBOR_TIMEOUT_MS,
};
pub use config::PeerConfig;
pub use registry::PeerRegistry;

use async_trait::async_trait;
use p2psim_cache::MemoryCache;
use p2psim_priority_queue::ReputationQueue;
use p2psim_origin::OriginModel;
use p2psim_transport::{ChunkProvider, MockTransport};
use p2psim_types::{
    hash_bytes, BandwidthTier, FileTransferEvent, Manifest, ManifestEntry, PeerId, PeerInfo,
    RequestRecord, RequestSource, Resource, ResourceHash, Role,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Everything the caller needs after one call to [`Peer::request_resource`]:
/// the resource itself (or `None` on total failure), the metrics record,
/// and — only on a successful peer-to-peer delivery — the transfer event
/// to append to the simulation's event log.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub resource: Option<Resource>,
    pub record: RequestRecord,
    pub transfer_event: Option<FileTransferEvent>,
}

/// A virtual peer.
pub struct Peer {
    peer_id: PeerId,
    config: PeerConfig,
    transport: Arc<MockTransport>,
    registry: Arc<PeerRegistry>,

    connection_start_ms: u64,
    is_connected: AtomicBool,
    role: StdMutex<Role>,
    /// Latest `now_ms` this peer has observed, so that [`ChunkProvider::grant_chunk`]
    /// (which the transport calls without a time parameter) can still
    /// evict expired cache entries lazily.
    clock_ms: AtomicU64,

    successful_uploads: AtomicU64,
    failed_transfers: AtomicU64,
    integrity_verifications: AtomicU64,

    cache: Mutex<MemoryCache<ResourceHash, Resource>>,
    peer_index: Mutex<HashMap<PeerId, PeerInfo>>,
    chunk_index: Mutex<HashMap<ResourceHash, ReputationQueue>>,
}

impl Peer {
    pub fn new(
        peer_id: PeerId,
        config: PeerConfig,
        transport: Arc<MockTransport>,
        registry: Arc<PeerRegistry>,
        connection_start_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            peer_id,
            config,
            transport,
            registry,
            connection_start_ms,
            is_connected: AtomicBool::new(true),
            role: StdMutex::new(Role::Transient),
            clock_ms: AtomicU64::new(connection_start_ms),
            successful_uploads: AtomicU64::new(0),
            failed_transfers: AtomicU64::new(0),
            integrity_verifications: AtomicU64::new(0),
            cache: Mutex::new(MemoryCache::new()),
            peer_index: Mutex::new(HashMap::new()),
            chunk_index: Mutex::new(HashMap::new()),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Relaxed)
    }

    pub fn role(&self) -> Role {
        *self.role.lock().expect("role mutex poisoned")
    }

    pub fn successful_uploads(&self) -> u64 {
        self.successful_uploads.load(Ordering::Relaxed)
    }

    pub fn failed_transfers(&self) -> u64 {
        self.failed_transfers.load(Ordering::Relaxed)
    }

    pub fn uptime_sec(&self, now_ms: u64) -> f64 {
        now_ms.saturating_sub(self.connection_start_ms) as f64 / 1000.0
    }

    /// `a*successfulUploads + b*bandwidthMbps + c*uptimeSec` in the
    /// browser model, extended with integrity/failed-transfer/storage/
    /// battery terms (zero-weighted unless [`ReputationWeights::server`]
    /// is in use). Deliberately unnormalized — raw Mbps units, per the
    /// source's explicit instruction that normalizing would shift the
    /// promote/demote thresholds.
    pub fn reputation(&self, now_ms: u64) -> f64 {
        let w = &self.config.reputation_weights;
        w.success * self.successful_uploads() as f64
            + w.bandwidth * self.config.bandwidth_mbps
            + w.uptime * self.uptime_sec(now_ms)
            + w.integrity * self.integrity_verifications.load(Ordering::Relaxed) as f64
            + w.failed_transfer * self.failed_transfers() as f64
            + w.storage * self.config.storage_mb.unwrap_or(0.0)
            + w.battery * self.config.battery_pct.unwrap_or(0.0)
    }

    pub fn record_successful_upload(&self) {
        self.successful_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_transfer(&self) {
        self.failed_transfers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_integrity_verification(&self) {
        self.integrity_verifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of this peer's cache, published to neighbors.
    pub async fn manifest(&self, now_ms: u64) -> Manifest {
        self.touch_clock(now_ms);
        let cache = self.cache.lock().await;
        let resources = cache
            .entries(now_ms)
            .map(|(hash, resource)| ManifestEntry {
                hash: *hash,
                byte_length: resource.byte_length(),
                mime_type: resource.mime_type.clone(),
                cached_at_seconds: resource.cached_at_seconds,
            })
            .collect();
        Manifest {
            peer_id: self.peer_id,
            generated_at_seconds: now_ms as f64 / 1000.0,
            resources,
        }
    }

    /// A value-copy snapshot of this peer, as another peer would store it
    /// in its own `peer_index`.
    pub async fn info_snapshot(&self, now_ms: u64) -> PeerInfo {
        let reputation = self.reputation(now_ms);
        PeerInfo {
            peer_id: self.peer_id,
            last_seen_ms: now_ms,
            bandwidth_mbps: self.config.bandwidth_mbps,
            uptime_sec: self.uptime_sec(now_ms),
            reputation,
            manifest: self.manifest(now_ms).await,
        }
    }

    /// Upsert a neighbor. Re-indexes `chunk_index` so that it only ever
    /// lists peers whose *current* manifest advertises a given hash —
    /// entries for hashes the neighbor no longer caches are dropped.
    pub async fn add_peer(&self, info: PeerInfo) {
        let peer_id = info.peer_id;
        let new_hashes: HashSet<ResourceHash> =
            info.manifest.resources.iter().map(|e| e.hash).collect();

        let previous = self.peer_index.lock().await.get(&peer_id).cloned();

        {
            let mut chunk_index = self.chunk_index.lock().await;
            if let Some(prev) = &previous {
                for entry in &prev.manifest.resources {
                    if !new_hashes.contains(&entry.hash) {
                        if let Some(queue) = chunk_index.get_mut(&entry.hash) {
                            queue.delete_peer(peer_id);
                            if queue.is_empty() {
                                chunk_index.remove(&entry.hash);
                            }
                        }
                    }
                }
            }
            for entry in &info.manifest.resources {
                chunk_index
                    .entry(entry.hash)
                    .or_default()
                    .insert(info.reputation, peer_id);
            }
        }

        self.peer_index.lock().await.insert(peer_id, info);
    }

    /// Prune neighbors silent for more than [`NEIGHBOR_TIMEOUT_MS`] and
    /// drop them from every chunk-index queue they appear in, preserving
    /// the invariant that every `chunk_index` entry names a live peer.
    pub async fn update_connections(&self, now_ms: u64) {
        self.touch_clock(now_ms);
        let stale: Vec<PeerId> = {
            let peer_index = self.peer_index.lock().await;
            peer_index
                .iter()
                .filter(|(_, info)| info.is_stale(now_ms))
                .map(|(id, _)| *id)
                .collect()
        };
        if stale.is_empty() {
            return;
        }

        {
            let mut peer_index = self.peer_index.lock().await;
            for id in &stale {
                peer_index.remove(id);
            }
        }
        let mut chunk_index = self.chunk_index.lock().await;
        for queue in chunk_index.values_mut() {
            for id in &stale {
                queue.delete_peer(*id);
            }
        }
        chunk_index.retain(|_, queue| !queue.is_empty());
        debug!(peer = %self.peer_id, pruned = stale.len(), "pruned stale neighbors");
    }

    /// Apply role hysteresis for one tick. One-way per call: a peer can
    /// promote or demote but never both in the same evaluation.
    pub fn update_role(&self, now_ms: u64) -> Role {
        let score = self.reputation(now_ms);
        let mut role = self.role.lock().expect("role mutex poisoned");
        let next = match *role {
            Role::Transient if score >= self.config.promote_threshold => Role::Anchor,
            Role::Anchor if score < self.config.demote_threshold() => Role::Transient,
            current => current,
        };
        if next != *role {
            trace!(peer = %self.peer_id, from = %*role, to = %next, score, "role transition");
        }
        *role = next;
        next
    }

    /// The highest-reputation hash this peer doesn't yet cache, among
    /// everything its chunk index currently advertises. Driven every
    /// role-update tick to propagate the target file through the swarm.
    pub async fn auto_fetch_candidate(&self, now_ms: u64) -> Option<ResourceHash> {
        let candidates: Vec<(ResourceHash, PeerId)> = {
            let chunk_index = self.chunk_index.lock().await;
            chunk_index
                .iter()
                .filter_map(|(hash, queue)| queue.peek_max().map(|peer_id| (*hash, peer_id)))
                .collect()
        };

        let mut best: Option<(f64, ResourceHash)> = None;
        for (hash, peer_id) in candidates {
            if self.cache.lock().await.has(&hash, now_ms) {
                continue;
            }
            let rep = {
                let peer_index = self.peer_index.lock().await;
                peer_index.get(&peer_id).map(|i| i.reputation)
            };
            let Some(rep) = rep else { continue };
            if best.map(|(best_rep, _)| rep > best_rep).unwrap_or(true) {
                best = Some((rep, hash));
            }
        }
        best.map(|(_, hash)| hash)
    }

    /// The central request pipeline: local cache, then reputation-ordered
    /// peers with retries, then origin.
    pub async fn request_resource(
        &self,
        hash: ResourceHash,
        now_ms: u64,
        origin: &OriginModel,
        origin_path: &str,
    ) -> RequestResult {
        self.touch_clock(now_ms);

        if let Some(resource) = self.cache.lock().await.get(&hash, now_ms).cloned() {
            return self.local_cache_hit(resource, now_ms);
        }

        let has_entry = self.chunk_index.lock().await.contains_key(&hash);
        if !has_entry {
            return self.fetch_from_origin(hash, now_ms, origin, origin_path).await;
        }

        for _attempt in 0..MAX_RETRIES {
            let Some(peer_id) = self.pick_fresh_candidate(hash).await else {
                return self.fetch_from_origin(hash, now_ms, origin, origin_path).await;
            };

            match self
                .transport
                .request_file(peer_id, hash, self.config.peer_request_timeout_ms)
                .await
            {
                Ok(resource) => {
                    if hash_bytes(&resource.content) != hash {
                        warn!(peer = %self.peer_id, served_by = %peer_id, "hash mismatch, discarding chunk");
                        self.record_failed_transfer();
                        if let Some(server) = self.registry.get(peer_id).await {
                            server.record_failed_transfer();
                        }
                        self.pop_candidate(hash, peer_id).await;
                        continue;
                    }

                    self.cache
                        .lock()
                        .await
                        .set(hash, resource.clone(), now_ms, None);
                    if let Some(server) = self.registry.get(peer_id).await {
                        server.record_successful_upload();
                    }
                    trace!(peer = %self.peer_id, served_by = %peer_id, %hash, "peer delivery succeeded");
                    return RequestResult {
                        resource: Some(resource),
                        record: self.record(
                            now_ms,
                            self.config.network_latency_ms as f64,
                            RequestSource::PeerCache,
                            true,
                        ),
                        transfer_event: Some(FileTransferEvent {
                            timestamp_ms: now_ms,
                            from: peer_id,
                            to: self.peer_id,
                            hash,
                            successful: true,
                        }),
                    };
                }
                Err(err) => {
                    debug!(peer = %self.peer_id, served_by = %peer_id, ?err, "peer delivery failed");
                    self.record_failed_transfer();
                    self.pop_candidate(hash, peer_id).await;
                }
            }
        }

        self.fetch_from_origin(hash, now_ms, origin, origin_path).await
    }

    /// Find the next candidate peer for `hash`, popping unknown or stale
    /// (manifest no longer contains `hash`) entries along the way without
    /// consuming a retry attempt.
    async fn pick_fresh_candidate(&self, hash: ResourceHash) -> Option<PeerId> {
        loop {
            let candidate = {
                let mut chunk_index = self.chunk_index.lock().await;
                let queue = chunk_index.get_mut(&hash)?;
                match queue.peek_max() {
                    Some(p) => p,
                    None => {
                        chunk_index.remove(&hash);
                        return None;
                    }
                }
            };

            let fresh = {
                let peer_index = self.peer_index.lock().await;
                peer_index
                    .get(&candidate)
                    .map(|info| info.manifest.contains(hash))
            };

            match fresh {
                Some(true) => return Some(candidate),
                Some(false) | None => self.pop_candidate(hash, candidate).await,
            }
        }
    }

    async fn pop_candidate(&self, hash: ResourceHash, peer_id: PeerId) {
        let mut chunk_index = self.chunk_index.lock().await;
        if let Some(queue) = chunk_index.get_mut(&hash) {
            queue.delete_peer(peer_id);
            if queue.is_empty() {
                chunk_index.remove(&hash);
            }
        }
    }

    async fn fetch_from_origin(
        &self,
        hash: ResourceHash,
        now_ms: u64,
        origin: &OriginModel,
        origin_path: &str,
    ) -> RequestResult {
        let outcome = origin.fetch(origin_path).await;
        let latency_ms = outcome.latency_ms + self.config.network_latency_ms as f64;

        if outcome.successful {
            if let Some(resource) = outcome.resource {
                self.cache
                    .lock()
                    .await
                    .set(hash, resource.clone(), now_ms, None);
                return RequestResult {
                    resource: Some(resource),
                    record: self.record(now_ms, latency_ms, RequestSource::Origin, true),
                    transfer_event: None,
                };
            }
        }

        RequestResult {
            resource: None,
            record: self.record(now_ms, latency_ms, RequestSource::Origin, false),
            transfer_event: None,
        }
    }

    fn local_cache_hit(&self, resource: Resource, now_ms: u64) -> RequestResult {
        RequestResult {
            resource: Some(resource),
            record: self.record(now_ms, 0.0, RequestSource::LocalCache, true),
            transfer_event: None,
        }
    }

    fn record(
        &self,
        now_ms: u64,
        latency_ms: f64,
        source: RequestSource,
        successful: bool,
    ) -> RequestRecord {
        RequestRecord {
            timestamp_ms: now_ms,
            latency_ms,
            source,
            peer_id: self.peer_id,
            peer_bandwidth_mbps: self.config.bandwidth_mbps,
            peer_bandwidth_tier: BandwidthTier::classify(self.config.bandwidth_mbps),
            successful,
            is_anchor: self.role() == Role::Anchor,
        }
    }

    /// Disconnects from the transport, failing any pending requests
    /// addressed to this peer with `ChannelClosed`.
    pub async fn disconnect(&self) {
        self.is_connected.store(false, Ordering::Relaxed);
        self.transport.disconnect(self.peer_id).await;
        debug!(peer = %self.peer_id, "peer left the swarm");
    }

    fn touch_clock(&self, now_ms: u64) {
        self.clock_ms.fetch_max(now_ms, Ordering::Relaxed);
    }

    fn clock(&self) -> u64 {
        self.clock_ms.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChunkProvider for Peer {
    async fn grant_chunk(&self, hash: ResourceHash) -> Option<Resource> {
        let now_ms = self.clock();
        self.cache.lock().await.get(&hash, now_ms).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use p2psim_transport::ParticipantLink;

    fn test_peer(id: u64, bandwidth_mbps: f64) -> Arc<Peer> {
        let transport = MockTransport::new();
        let registry = PeerRegistry::new();
        Peer::new(
            PeerId::new(id),
            PeerConfig::in_memory(bandwidth_mbps, 20),
            transport,
            registry,
            0,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn local_cache_hit_never_touches_origin() {
        let peer = test_peer(1, 50.0);
        let resource = Resource::new(Bytes::from_static(b"hello"), "text/plain", 0.0);
        let hash = hash_bytes(b"hello");
        peer.cache.lock().await.set(hash, resource.clone(), 0, None);

        let origin = OriginModel::new(p2psim_origin::OriginConfig::default());
        let result = peer.request_resource(hash, 0, &origin, "/target").await;

        assert_eq!(result.resource, Some(resource));
        assert_eq!(result.record.source, RequestSource::LocalCache);
        assert!(result.transfer_event.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn miss_with_no_chunk_index_entry_falls_back_to_origin() {
        let peer = test_peer(1, 50.0);
        let origin = OriginModel::new(p2psim_origin::OriginConfig::default());
        let resource = Resource::new(Bytes::from_static(b"origin-bytes"), "text/plain", 0.0);
        origin.publish("/target", resource.clone()).await;

        let hash = hash_bytes(b"origin-bytes");
        let result = peer.request_resource(hash, 0, &origin, "/target").await;

        assert_eq!(result.resource, Some(resource));
        assert_eq!(result.record.source, RequestSource::Origin);
        assert!(result.record.successful);
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_from_best_peer_and_credits_it() {
        let transport = MockTransport::new();
        let registry = PeerRegistry::new();
        // Re-home both peers onto a shared transport/registry.
        let requester = Peer::new(
            PeerId::new(1),
            PeerConfig::in_memory(50.0, 10),
            Arc::clone(&transport),
            Arc::clone(&registry),
            0,
        );
        let provider = Peer::new(
            PeerId::new(2),
            PeerConfig::in_memory(80.0, 10),
            Arc::clone(&transport),
            Arc::clone(&registry),
            0,
        );
        registry.register(Arc::clone(&requester)).await;
        registry.register(Arc::clone(&provider)).await;

        let resource = Resource::new(Bytes::from_static(b"payload"), "text/plain", 0.0);
        let hash = hash_bytes(b"payload");
        provider
            .cache
            .lock()
            .await
            .set(hash, resource.clone(), 0, None);

        transport
            .join(
                "swarm",
                ParticipantLink {
                    peer_id: PeerId::new(2),
                    latency_ms: 1,
                    bandwidth_mbps: 100.0,
                },
                Arc::clone(&provider) as Arc<dyn ChunkProvider>,
            )
            .await;

        let mut manifest = Manifest::empty(PeerId::new(2), 0.0);
        manifest.resources.push(ManifestEntry {
            hash,
            byte_length: resource.byte_length(),
            mime_type: "text/plain".into(),
            cached_at_seconds: 0.0,
        });
        requester
            .add_peer(PeerInfo {
                peer_id: PeerId::new(2),
                last_seen_ms: 0,
                bandwidth_mbps: 80.0,
                uptime_sec: 0.0,
                reputation: 10.0,
                manifest,
            })
            .await;

        let origin = OriginModel::new(p2psim_origin::OriginConfig::default());
        let result = requester
            .request_resource(hash, 0, &origin, "/unused")
            .await;

        assert_eq!(result.resource, Some(resource));
        assert_eq!(result.record.source, RequestSource::PeerCache);
        assert_eq!(provider.successful_uploads(), 1);
        let event = result.transfer_event.expect("expected a transfer event");
        assert_eq!(event.from, PeerId::new(2));
        assert_eq!(event.to, PeerId::new(1));
    }

    #[tokio::test]
    async fn add_peer_is_idempotent() {
        let peer = test_peer(1, 50.0);
        let mut manifest = Manifest::empty(PeerId::new(2), 0.0);
        manifest.resources.push(ManifestEntry {
            hash: hash_bytes(b"x"),
            byte_length: 1,
            mime_type: "text/plain".into(),
            cached_at_seconds: 0.0,
        });
        let info = PeerInfo {
            peer_id: PeerId::new(2),
            last_seen_ms: 0,
            bandwidth_mbps: 10.0,
            uptime_sec: 0.0,
            reputation: 1.0,
            manifest,
        };

        peer.add_peer(info.clone()).await;
        peer.add_peer(info).await;

        assert_eq!(peer.peer_index.lock().await.len(), 1);
        assert_eq!(
            peer.chunk_index
                .lock()
                .await
                .get(&hash_bytes(b"x"))
                .map(|q| q.size()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn update_connections_prunes_stale_neighbors_from_chunk_index() {
        let peer = test_peer(1, 50.0);
        let mut manifest = Manifest::empty(PeerId::new(2), 0.0);
        manifest.resources.push(ManifestEntry {
            hash: hash_bytes(b"x"),
            byte_length: 1,
            mime_type: "text/plain".into(),
            cached_at_seconds: 0.0,
        });
        peer.add_peer(PeerInfo {
            peer_id: PeerId::new(2),
            last_seen_ms: 0,
            bandwidth_mbps: 10.0,
            uptime_sec: 0.0,
            reputation: 1.0,
            manifest,
        })
        .await;

        peer.update_connections(30_001).await;

        assert!(peer.peer_index.lock().await.is_empty());
        assert!(peer.chunk_index.lock().await.is_empty());
    }

    #[test]
    fn role_promotes_then_demotes_with_hysteresis() {
        // Under the browser weight set reputation is monotonically
        // non-decreasing (successes only accumulate, bandwidth is fixed,
        // uptime only grows), so a demotion needs a negative term —
        // the server weight set's penalty on failed transfers.
        let transport = MockTransport::new();
        let registry = PeerRegistry::new();
        let mut config = PeerConfig::webrtc(4.0, 10);
        config.promote_threshold = 5.0;
        let peer = Peer::new(PeerId::new(1), config, transport, registry, 0);

        assert_eq!(peer.role(), Role::Transient);
        peer.record_successful_upload();
        // reputation = 1*1 (success) + 1*4 (bandwidth) = 5 >= 5 -> anchor
        assert_eq!(peer.update_role(0), Role::Anchor);

        // Demote threshold is 0.85 * 5 = 4.25. Three failed transfers at
        // weight -1 drop reputation from 5 to 2, well under it.
        peer.record_failed_transfer();
        peer.record_failed_transfer();
        peer.record_failed_transfer();
        assert_eq!(peer.update_role(0), Role::Transient);
    }
}
