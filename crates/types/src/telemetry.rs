//! Shared record types written by the request pipeline and read by the
//! metrics aggregator.
//!
//! Kept in `p2psim-types` rather than `p2psim-metrics` so that `p2psim-peer`
//! can construct these records directly (it already knows its own id,
//! bandwidth and role at the point a request completes) without the
//! metrics crate depending on the peer crate.

use crate::{PeerId, ResourceHash};
use serde::{Deserialize, Serialize};

/// Where a request's resource was ultimately served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestSource {
    LocalCache,
    PeerCache,
    Origin,
}

/// Coarse bandwidth bucket used to slice metrics by device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandwidthTier {
    Low,
    Medium,
    High,
}

impl BandwidthTier {
    /// `low` below 25 Mbps, `medium` below 75 Mbps, `high` otherwise.
    pub fn classify(bandwidth_mbps: f64) -> Self {
        if bandwidth_mbps < 25.0 {
            BandwidthTier::Low
        } else if bandwidth_mbps < 75.0 {
            BandwidthTier::Medium
        } else {
            BandwidthTier::High
        }
    }
}

/// One completed request, as recorded by the issuing peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub timestamp_ms: u64,
    pub latency_ms: f64,
    pub source: RequestSource,
    pub peer_id: PeerId,
    pub peer_bandwidth_mbps: f64,
    pub peer_bandwidth_tier: BandwidthTier,
    pub successful: bool,
    pub is_anchor: bool,
}

/// A peer-to-peer chunk delivery, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferEvent {
    pub timestamp_ms: u64,
    pub from: PeerId,
    pub to: PeerId,
    pub hash: ResourceHash,
    pub successful: bool,
}

/// A peer joining the swarm, emitted by the driver at schedule time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerJoinEvent {
    pub peer_id: PeerId,
    pub timestamp_ms: u64,
    pub joined_via_anchor: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_tier_boundaries() {
        assert_eq!(BandwidthTier::classify(0.0), BandwidthTier::Low);
        assert_eq!(BandwidthTier::classify(24.9), BandwidthTier::Low);
        assert_eq!(BandwidthTier::classify(25.0), BandwidthTier::Medium);
        assert_eq!(BandwidthTier::classify(74.9), BandwidthTier::Medium);
        assert_eq!(BandwidthTier::classify(75.0), BandwidthTier::High);
    }
}
