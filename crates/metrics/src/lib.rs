//! Aggregates per-request telemetry emitted by `p2psim-peer` into the
//! final [`SimulationResults`] a driver hands back to its caller.
//!
//! The aggregator itself is a set of append-only sinks behind
//! `std::sync::Mutex` — recording never awaits, so there's no reason to
//! pull in `tokio::sync::Mutex` here. `finalize` does all the real work,
//! once, at the end of a run.

mod fairness;
mod percentile;
mod propagation;
mod results;
mod timeseries;
mod worst_case;

pub use fairness::jain_fairness_index;
pub use percentile::percentile;
pub use results::{
    LatencyByNodeType, LatencyPercentiles, NodeTypeLatency, PropagationMetrics, SimulationResults,
    TimeSeriesBucket, WorstCaseMetrics, WorstPerformingPeer,
};

use p2psim_types::{FileTransferEvent, PeerId, PeerJoinEvent, RequestRecord, RequestSource};
use propagation::compute_propagation;
use std::sync::Mutex;
use timeseries::compute_time_series;
use worst_case::compute_worst_case;

/// Run-level context a driver supplies once its simulation loop ends.
/// Nothing here could be derived from the recorded events alone.
#[derive(Debug, Clone)]
pub struct FinalizeContext {
    pub peers_simulated: usize,
    pub duration_sec: f64,
    pub anchor_nodes: Vec<PeerId>,
    pub churn_events: Option<u64>,
    pub recovery_speed: Option<f64>,
}

/// Append-only collector for one simulation run's telemetry.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    requests: Mutex<Vec<RequestRecord>>,
    transfers: Mutex<Vec<FileTransferEvent>>,
    joins: Mutex<Vec<PeerJoinEvent>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, record: RequestRecord) {
        self.requests.lock().expect("metrics mutex poisoned").push(record);
    }

    pub fn record_transfer(&self, event: FileTransferEvent) {
        self.transfers.lock().expect("metrics mutex poisoned").push(event);
    }

    pub fn record_join(&self, event: PeerJoinEvent) {
        self.joins.lock().expect("metrics mutex poisoned").push(event);
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("metrics mutex poisoned").len()
    }

    /// A point-in-time copy of every request recorded so far. Used by the
    /// driver to compute `recovery_speed` against churn-leave timestamps it
    /// tracks itself — the aggregator has no notion of churn.
    pub fn requests_snapshot(&self) -> Vec<RequestRecord> {
        self.requests.lock().expect("metrics mutex poisoned").clone()
    }

    /// Consumes the recorded telemetry and computes every derived field of
    /// [`SimulationResults`]. Takes `&self` rather than `self` since a
    /// driver may want to keep recording after an interim snapshot.
    pub fn finalize(&self, ctx: FinalizeContext) -> SimulationResults {
        let records = self.requests.lock().expect("metrics mutex poisoned").clone();
        let transfers = self.transfers.lock().expect("metrics mutex poisoned").clone();
        let joins = self.joins.lock().expect("metrics mutex poisoned").clone();

        let total_requests = records.len() as u64;
        let local_cache_hits =
            records.iter().filter(|r| r.source == RequestSource::LocalCache).count() as u64;
        let peer_requests =
            records.iter().filter(|r| r.source == RequestSource::PeerCache).count() as u64;
        let origin_requests =
            records.iter().filter(|r| r.source == RequestSource::Origin).count() as u64;
        let network_requests = peer_requests + origin_requests;

        let cache_hit_ratio = if total_requests > 0 {
            (peer_requests + local_cache_hits) as f64 / total_requests as f64 * 100.0
        } else {
            0.0
        };
        let network_cache_hit_ratio = if network_requests > 0 {
            peer_requests as f64 / network_requests as f64 * 100.0
        } else {
            0.0
        };
        // bandwidth_saved and cache_hit_ratio are the same quantity viewed
        // from two angles: every request served without hitting the
        // origin is bandwidth the origin didn't spend.
        let bandwidth_saved = cache_hit_ratio;

        let mut all_latencies: Vec<f64> = records.iter().map(|r| r.latency_ms).collect();
        all_latencies.sort_by(f64::total_cmp);
        let avg_latency = mean(&all_latencies);

        let mut network_latencies: Vec<f64> = records
            .iter()
            .filter(|r| r.source != RequestSource::LocalCache)
            .map(|r| r.latency_ms)
            .collect();
        network_latencies.sort_by(f64::total_cmp);
        let network_avg_latency = mean(&network_latencies);

        let origin_latencies: Vec<f64> = records
            .iter()
            .filter(|r| r.source == RequestSource::Origin)
            .map(|r| r.latency_ms)
            .collect();
        let latency_improvement = if origin_latencies.is_empty() {
            None
        } else {
            let avg_origin = mean(&origin_latencies);
            (avg_origin > 0.0).then(|| (avg_origin - avg_latency) / avg_origin * 100.0)
        };

        let latency_percentiles = LatencyPercentiles {
            p50: percentile(&all_latencies, 0.50),
            p75: percentile(&all_latencies, 0.75),
            p90: percentile(&all_latencies, 0.90),
            p95: percentile(&all_latencies, 0.95),
            p99: percentile(&all_latencies, 0.99),
        };

        let latency_by_node_type = LatencyByNodeType {
            anchor: node_type_latency(&records, true),
            transient: node_type_latency(&records, false),
        };

        let worst_case_metrics = compute_worst_case(&records);

        // Seeded with every peer that took part in the run (as a requester),
        // not just the ones that served an upload — Jain's index is about
        // *distribution across the swarm*, so a peer that served nothing
        // must count as a zero, not be left out of `n` entirely.
        let mut uploads_by_peer: std::collections::HashMap<PeerId, f64> = records
            .iter()
            .map(|r| (r.peer_id, 0.0))
            .collect();
        for transfer in transfers.iter().filter(|t| t.successful) {
            *uploads_by_peer.entry(transfer.from).or_insert(0.0) += 1.0;
        }
        let jain_index =
            jain_fairness_index(&uploads_by_peer.values().copied().collect::<Vec<_>>());

        let (file_propagation_time, mut propagation_metrics) =
            compute_propagation(&records, ctx.peers_simulated);
        propagation_metrics.origin_load_reduction = (network_requests > 0)
            .then(|| 1.0 - origin_requests as f64 / network_requests as f64);

        let time_series = compute_time_series(&records);

        SimulationResults {
            total_requests,
            peer_requests,
            origin_requests,
            local_cache_hits,
            network_requests,
            cache_hit_ratio,
            network_cache_hit_ratio,
            bandwidth_saved,
            avg_latency,
            network_avg_latency,
            latency_improvement,
            latency_percentiles,
            latency_by_node_type,
            worst_case_metrics,
            jain_fairness_index: jain_index,
            file_propagation_time,
            propagation_metrics,
            recovery_speed: ctx.recovery_speed,
            peer_join_events: joins,
            file_transfer_events: transfers,
            anchor_nodes: ctx.anchor_nodes,
            all_request_metrics: records,
            peers_simulated: ctx.peers_simulated,
            duration: ctx.duration_sec,
            churn_events: ctx.churn_events,
            time_series,
        }
    }
}

fn mean(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        0.0
    } else {
        sorted.iter().sum::<f64>() / sorted.len() as f64
    }
}

fn node_type_latency(records: &[RequestRecord], anchor: bool) -> NodeTypeLatency {
    let mut lats: Vec<f64> =
        records.iter().filter(|r| r.is_anchor == anchor).map(|r| r.latency_ms).collect();
    lats.sort_by(f64::total_cmp);
    NodeTypeLatency {
        avg_latency: mean(&lats),
        p5: percentile(&lats, 0.05),
        p50: percentile(&lats, 0.50),
        p95: percentile(&lats, 0.95),
        p99: percentile(&lats, 0.99),
        request_count: lats.len() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p2psim_types::BandwidthTier;

    fn request(
        peer: u64,
        ts: u64,
        latency: f64,
        source: RequestSource,
        is_anchor: bool,
    ) -> RequestRecord {
        RequestRecord {
            timestamp_ms: ts,
            latency_ms: latency,
            source,
            peer_id: PeerId::new(peer),
            peer_bandwidth_mbps: 10.0,
            peer_bandwidth_tier: BandwidthTier::Low,
            successful: true,
            is_anchor,
        }
    }

    fn empty_context() -> FinalizeContext {
        FinalizeContext {
            peers_simulated: 4,
            duration_sec: 60.0,
            anchor_nodes: vec![PeerId::new(1)],
            churn_events: None,
            recovery_speed: None,
        }
    }

    #[test]
    fn finalize_with_no_records_is_all_zero() {
        let aggregator = MetricsAggregator::new();
        let results = aggregator.finalize(empty_context());
        assert_eq!(results.total_requests, 0);
        assert_eq!(results.cache_hit_ratio, 0.0);
        assert!(results.file_propagation_time.is_none());
    }

    #[test]
    fn cache_hit_ratio_counts_local_and_peer_hits() {
        let aggregator = MetricsAggregator::new();
        aggregator.record_request(request(1, 0, 1.0, RequestSource::LocalCache, false));
        aggregator.record_request(request(1, 100, 5.0, RequestSource::PeerCache, false));
        aggregator.record_request(request(1, 200, 50.0, RequestSource::Origin, false));
        aggregator.record_request(request(1, 300, 50.0, RequestSource::Origin, false));

        let results = aggregator.finalize(empty_context());
        assert_eq!(results.total_requests, 4);
        assert_eq!(results.cache_hit_ratio, 50.0);
        assert_eq!(results.network_cache_hit_ratio, 1.0 / 3.0 * 100.0);
        assert_eq!(results.bandwidth_saved, results.cache_hit_ratio);
    }

    #[test]
    fn jain_fairness_reflects_upload_distribution_across_servers() {
        let aggregator = MetricsAggregator::new();
        let hash = p2psim_types::hash_bytes(b"x");
        aggregator.record_transfer(FileTransferEvent {
            timestamp_ms: 0,
            from: PeerId::new(1),
            to: PeerId::new(2),
            hash,
            successful: true,
        });
        aggregator.record_transfer(FileTransferEvent {
            timestamp_ms: 1,
            from: PeerId::new(1),
            to: PeerId::new(3),
            hash,
            successful: true,
        });

        let results = aggregator.finalize(empty_context());
        // a single peer served every upload: 1/n disparity for n=1 server.
        assert_eq!(results.jain_fairness_index, 1.0);
    }

    #[test]
    fn jain_fairness_counts_idle_peers_as_zero_not_as_absent() {
        let aggregator = MetricsAggregator::new();
        let hash = p2psim_types::hash_bytes(b"x");
        // Three peers take part in the run (each issues a request), but
        // only peer 1 ever serves an upload. Peers 2 and 3 must still
        // count toward `n` as zero-servers, not be dropped from the sample.
        aggregator.record_request(request(1, 0, 1.0, RequestSource::LocalCache, false));
        aggregator.record_request(request(2, 0, 1.0, RequestSource::PeerCache, false));
        aggregator.record_request(request(3, 0, 1.0, RequestSource::PeerCache, false));
        aggregator.record_transfer(FileTransferEvent {
            timestamp_ms: 0,
            from: PeerId::new(1),
            to: PeerId::new(2),
            hash,
            successful: true,
        });
        aggregator.record_transfer(FileTransferEvent {
            timestamp_ms: 1,
            from: PeerId::new(1),
            to: PeerId::new(3),
            hash,
            successful: true,
        });

        let results = aggregator.finalize(empty_context());
        // values are [2.0, 0.0, 0.0]: (2)^2 / (3 * 4) = 1/3.
        assert!((results.jain_fairness_index - (1.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn latency_by_node_type_splits_on_is_anchor() {
        let aggregator = MetricsAggregator::new();
        aggregator.record_request(request(1, 0, 10.0, RequestSource::PeerCache, true));
        aggregator.record_request(request(2, 0, 40.0, RequestSource::PeerCache, false));

        let results = aggregator.finalize(empty_context());
        assert_eq!(results.latency_by_node_type.anchor.request_count, 1);
        assert_eq!(results.latency_by_node_type.transient.request_count, 1);
        assert_eq!(results.latency_by_node_type.anchor.avg_latency, 10.0);
        assert_eq!(results.latency_by_node_type.transient.avg_latency, 40.0);
    }
}
