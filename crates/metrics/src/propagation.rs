//! Propagation milestones: how long it took the swarm to pick up the
//! resource after its first origin fetch.

use crate::results::PropagationMetrics;
use p2psim_types::{PeerId, RequestRecord, RequestSource};
use std::collections::HashMap;

/// Returns `(file_propagation_time, metrics)`. `origin_load_reduction` is
/// left `None` here — it needs peer/origin request counts the caller
/// already has, so `MetricsAggregator::finalize` fills it in afterward.
pub fn compute_propagation(
    records: &[RequestRecord],
    total_peers: usize,
) -> (Option<f64>, PropagationMetrics) {
    let Some(first_origin_ms) = records
        .iter()
        .filter(|r| r.successful && r.source == RequestSource::Origin)
        .map(|r| r.timestamp_ms)
        .min()
    else {
        return (None, PropagationMetrics::default());
    };

    let first_p2p_ms = records
        .iter()
        .filter(|r| r.successful && r.source == RequestSource::PeerCache)
        .map(|r| r.timestamp_ms)
        .min();

    let mut first_receive: HashMap<PeerId, u64> = HashMap::new();
    for record in records.iter().filter(|r| r.successful) {
        first_receive
            .entry(record.peer_id)
            .and_modify(|t| *t = (*t).min(record.timestamp_ms))
            .or_insert(record.timestamp_ms);
    }

    let mut elapsed: Vec<f64> = first_receive
        .values()
        .map(|&t| t.saturating_sub(first_origin_ms) as f64)
        .collect();
    elapsed.sort_by(f64::total_cmp);

    let total = total_peers.max(1);
    let time_to_pct = |pct: f64| -> Option<f64> {
        let needed = ((pct * total as f64).ceil() as usize).max(1);
        elapsed.get(needed - 1).copied()
    };

    let time_to_50_percent = time_to_pct(0.5);
    let time_to_90_percent = time_to_pct(0.9);
    let time_to_100_percent = time_to_pct(1.0);

    let avg_time_to_receive = if elapsed.is_empty() {
        None
    } else {
        Some(elapsed.iter().sum::<f64>() / elapsed.len() as f64)
    };

    let propagation_rate = time_to_100_percent
        .filter(|&t| t > 0.0)
        .map(|t| elapsed.len() as f64 / (t / 1000.0));

    let time_to_first_p2p = first_p2p_ms.map(|t| t.saturating_sub(first_origin_ms) as f64);

    let metrics = PropagationMetrics {
        time_to_50_percent,
        time_to_90_percent,
        time_to_100_percent,
        avg_time_to_receive,
        propagation_rate,
        time_to_first_p2p,
        origin_load_reduction: None,
    };

    (time_to_100_percent, metrics)
}
