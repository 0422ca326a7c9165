//! What one peer knows about another.

use crate::{Manifest, PeerId};
use serde::{Deserialize, Serialize};

/// A value-copy snapshot of a remote peer, as held in a peer's own
/// `peerIndex`.
///
/// Cross-peer reads go through this snapshot rather than a shared
/// reference: each peer owns its state exclusively and publishes updates
/// by value, which is what lets many peer loops run concurrently without
/// locking each other's indices (see the concurrency model in
/// `SPEC_FULL.md` §5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub peer_id: PeerId,
    pub last_seen_ms: u64,
    pub bandwidth_mbps: f64,
    pub uptime_sec: f64,
    pub reputation: f64,
    pub manifest: Manifest,
}

/// Neighbor entries older than this since `last_seen_ms` are pruned by
/// `update_connections`.
pub const NEIGHBOR_TIMEOUT_MS: u64 = 30_000;

impl PeerInfo {
    /// Whether this entry is stale as of `now_ms`.
    pub fn is_stale(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_seen_ms) > NEIGHBOR_TIMEOUT_MS
    }
}
