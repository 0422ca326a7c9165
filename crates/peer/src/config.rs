//! Per-peer tuning: device parameters, timeouts, and the reputation
//! formula's weights.

use serde::{Deserialize, Serialize};

/// Weights for the reputation formula.
///
/// The source protocol has two shapes: a 3-factor browser-facing formula
/// (successful uploads, bandwidth, uptime) and an extended 7-factor
/// server-facing one that also folds in integrity verifications, failed
/// transfers, storage and battery. Rather than carry two formula shapes,
/// every weight is always present and unused factors are simply zeroed —
/// the formula itself never changes shape, only which terms are live.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReputationWeights {
    pub success: f64,
    pub bandwidth: f64,
    pub uptime: f64,
    pub integrity: f64,
    /// Typically negative: a peer that ships bad chunks should lose
    /// reputation, not gain it.
    pub failed_transfer: f64,
    pub storage: f64,
    pub battery: f64,
}

impl ReputationWeights {
    /// The source's browser-facing model: all weights 1.0, the remaining
    /// four factors zeroed.
    pub fn browser() -> Self {
        Self {
            success: 1.0,
            bandwidth: 1.0,
            uptime: 1.0,
            integrity: 0.0,
            failed_transfer: 0.0,
            storage: 0.0,
            battery: 0.0,
        }
    }

    /// The source's server-facing model: every factor live, failed
    /// transfers penalized.
    pub fn server() -> Self {
        Self {
            success: 1.0,
            bandwidth: 1.0,
            uptime: 1.0,
            integrity: 1.0,
            failed_transfer: -1.0,
            storage: 1.0,
            battery: 1.0,
        }
    }
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self::browser()
    }
}

/// Neighbor entries are pruned after this many ms of silence.
pub const NEIGHBOR_TIMEOUT_MS: u64 = 30_000;

/// Maximum number of candidate peers tried before falling back to origin.
pub const MAX_RETRIES: u32 = 3;

/// Default role-update / auto-fetch tick interval.
pub const DEFAULT_ROLE_UPDATE_INTERVAL_MS: u64 = 10_000;

/// Per-peer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub bandwidth_mbps: f64,
    pub network_latency_ms: u64,
    pub storage_mb: Option<f64>,
    pub battery_pct: Option<f64>,
    pub role_update_interval_ms: u64,
    /// Timeout for a single peer-to-peer chunk request. The source has two
    /// defaults depending on transport variant (3 s in-memory, 30 s real
    /// WebRTC); both are exposed here via the named constructors below.
    pub peer_request_timeout_ms: u64,
    pub reputation_weights: ReputationWeights,
    /// Reputation score at/above which a transient peer is promoted to
    /// anchor. Demotion uses `0.85 * promote_threshold` (spec-mandated
    /// hysteresis ratio).
    pub promote_threshold: f64,
}

impl PeerConfig {
    /// Default timeout for the in-memory mock-transport variant: 3 s.
    pub fn in_memory(bandwidth_mbps: f64, network_latency_ms: u64) -> Self {
        Self {
            bandwidth_mbps,
            network_latency_ms,
            storage_mb: None,
            battery_pct: None,
            role_update_interval_ms: DEFAULT_ROLE_UPDATE_INTERVAL_MS,
            peer_request_timeout_ms: 3_000,
            reputation_weights: ReputationWeights::browser(),
            promote_threshold: 5.0,
        }
    }

    /// Default timeout matching a real WebRTC deployment: 30 s.
    pub fn webrtc(bandwidth_mbps: f64, network_latency_ms: u64) -> Self {
        Self {
            peer_request_timeout_ms: 30_000,
            reputation_weights: ReputationWeights::server(),
            ..Self::in_memory(bandwidth_mbps, network_latency_ms)
        }
    }

    pub fn demote_threshold(&self) -> f64 {
        self.promote_threshold * 0.85
    }
}
