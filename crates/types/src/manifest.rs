//! A peer's advertisement of what it currently caches.

use crate::{PeerId, ResourceHash};
use serde::{Deserialize, Serialize};

/// One entry in a published [`Manifest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub hash: ResourceHash,
    pub byte_length: u64,
    pub mime_type: String,
    pub cached_at_seconds: f64,
}

/// Snapshot of a peer's cache, published to neighbors and read-only after
/// publication — a new manifest replaces the old one wholesale, it is
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub peer_id: PeerId,
    pub generated_at_seconds: f64,
    pub resources: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn empty(peer_id: PeerId, generated_at_seconds: f64) -> Self {
        Self {
            peer_id,
            generated_at_seconds,
            resources: Vec::new(),
        }
    }

    /// Whether this manifest currently advertises `hash`.
    ///
    /// Used by the request pipeline to discard stale chunk-index entries:
    /// a peer id appearing in a priority queue is only a *candidate* until
    /// its latest manifest is checked here.
    pub fn contains(&self, hash: ResourceHash) -> bool {
        self.resources.iter().any(|e| e.hash == hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_bytes;

    #[test]
    fn empty_manifest_contains_nothing() {
        let m = Manifest::empty(PeerId::new(1), 0.0);
        assert!(!m.contains(hash_bytes(b"x")));
    }

    #[test]
    fn contains_reflects_published_entries() {
        let h = hash_bytes(b"x");
        let m = Manifest {
            peer_id: PeerId::new(1),
            generated_at_seconds: 1.0,
            resources: vec![ManifestEntry {
                hash: h,
                byte_length: 1,
                mime_type: "text/plain".into(),
                cached_at_seconds: 1.0,
            }],
        };
        assert!(m.contains(h));
        assert!(!m.contains(hash_bytes(b"y")));
    }
}
