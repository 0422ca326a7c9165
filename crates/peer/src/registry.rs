//! Process-wide lookup from `PeerId` to the live peer, standing in for
//! the source's shared-reference graph of peer objects.
//!
//! Peers never hold a reference to one another. A peer's `chunkIndex`
//! stores candidate `PeerId`s, and crediting or penalizing the peer that
//! served (or failed to serve) a chunk goes through this registry rather
//! than through any reference the requester might have cached — that
//! reference would go stale the moment the remote peer churns out.

use crate::Peer;
use p2psim_types::PeerId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Simulation-wide peer registry, shared via `Arc` by every peer and the
/// driver.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
}

impl PeerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, peer: Arc<Peer>) {
        self.peers.write().await.insert(peer.peer_id(), peer);
    }

    pub async fn unregister(&self, peer_id: PeerId) {
        self.peers.write().await.remove(&peer_id);
    }

    pub async fn get(&self, peer_id: PeerId) -> Option<Arc<Peer>> {
        self.peers.read().await.get(&peer_id).cloned()
    }

    pub async fn all(&self) -> Vec<Arc<Peer>> {
        self.peers.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
