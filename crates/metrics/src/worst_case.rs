//! Worst-performing-peer detection: the peer whose own p99 latency is
//! highest, not the single slowest request.

use crate::percentile::percentile;
use crate::results::{WorstCaseMetrics, WorstPerformingPeer};
use p2psim_types::{PeerId, RequestRecord};
use std::collections::HashMap;

pub fn compute_worst_case(records: &[RequestRecord]) -> WorstCaseMetrics {
    let mut overall: Vec<f64> = records.iter().map(|r| r.latency_ms).collect();
    overall.sort_by(f64::total_cmp);
    let p99_latency = percentile(&overall, 0.99);

    let mut by_peer: HashMap<PeerId, Vec<&RequestRecord>> = HashMap::new();
    for record in records {
        by_peer.entry(record.peer_id).or_default().push(record);
    }

    let mut worst_performing_peer = None;
    let mut worst_p99 = f64::NEG_INFINITY;
    for (peer_id, peer_records) in &by_peer {
        let mut lats: Vec<f64> = peer_records.iter().map(|r| r.latency_ms).collect();
        lats.sort_by(f64::total_cmp);
        let peer_p99 = percentile(&lats, 0.99);
        if peer_p99 > worst_p99 {
            worst_p99 = peer_p99;
            let avg_latency = lats.iter().sum::<f64>() / lats.len() as f64;
            let last = peer_records.last().expect("non-empty by construction");
            worst_performing_peer = Some(WorstPerformingPeer {
                id: *peer_id,
                latency: avg_latency,
                bandwidth: last.peer_bandwidth_mbps,
                tier: last.peer_bandwidth_tier,
                is_anchor: last.is_anchor,
                p99_latency: peer_p99,
            });
        }
    }

    WorstCaseMetrics {
        p99_latency,
        worst_performing_peer,
    }
}
