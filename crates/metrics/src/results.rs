//! The shape of [`crate::MetricsAggregator::finalize`]'s output, matching
//! the field set in `SPEC_FULL.md` §6 exactly — declaration order here is
//! the canonical JSON key order once this struct is handed to
//! `serde_json`.

use p2psim_types::{BandwidthTier, FileTransferEvent, PeerId, PeerJoinEvent, RequestRecord};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyPercentiles {
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTypeLatency {
    pub avg_latency: f64,
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub request_count: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencyByNodeType {
    pub anchor: NodeTypeLatency,
    pub transient: NodeTypeLatency,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorstPerformingPeer {
    pub id: PeerId,
    pub latency: f64,
    pub bandwidth: f64,
    pub tier: BandwidthTier,
    pub is_anchor: bool,
    pub p99_latency: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorstCaseMetrics {
    pub p99_latency: f64,
    pub worst_performing_peer: Option<WorstPerformingPeer>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationMetrics {
    pub time_to_50_percent: Option<f64>,
    pub time_to_90_percent: Option<f64>,
    pub time_to_100_percent: Option<f64>,
    pub avg_time_to_receive: Option<f64>,
    pub propagation_rate: Option<f64>,
    pub time_to_first_p2p: Option<f64>,
    pub origin_load_reduction: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesBucket {
    pub second: u64,
    pub avg_latency: f64,
    pub cache_hit_ratio: f64,
}

/// The complete result of one simulation run. Field order is the
/// canonical JSON key order; numeric fields that can be undefined are
/// always `Option`, never `NaN`. Renamed to camelCase on the wire to match
/// the field names `SPEC_FULL.md` §6 names exactly, since a dashboard
/// consuming this JSON is one of this crate's intended hosts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResults {
    pub total_requests: u64,
    pub peer_requests: u64,
    pub origin_requests: u64,
    pub local_cache_hits: u64,
    pub network_requests: u64,

    pub cache_hit_ratio: f64,
    pub network_cache_hit_ratio: f64,
    pub bandwidth_saved: f64,

    pub avg_latency: f64,
    pub network_avg_latency: f64,
    pub latency_improvement: Option<f64>,

    pub latency_percentiles: LatencyPercentiles,
    pub latency_by_node_type: LatencyByNodeType,

    pub worst_case_metrics: WorstCaseMetrics,

    pub jain_fairness_index: f64,

    pub file_propagation_time: Option<f64>,
    pub propagation_metrics: PropagationMetrics,

    pub recovery_speed: Option<f64>,

    pub peer_join_events: Vec<PeerJoinEvent>,
    pub file_transfer_events: Vec<FileTransferEvent>,
    pub anchor_nodes: Vec<PeerId>,
    pub all_request_metrics: Vec<RequestRecord>,

    pub peers_simulated: usize,
    pub duration: f64,
    pub churn_events: Option<u64>,

    pub time_series: Vec<TimeSeriesBucket>,
}
