//! 1-second time-series buckets: per-bucket average latency alongside a
//! cumulative (rolling) cache-hit ratio through the end of that second.

use crate::results::TimeSeriesBucket;
use p2psim_types::{RequestRecord, RequestSource};

pub fn compute_time_series(records: &[RequestRecord]) -> Vec<TimeSeriesBucket> {
    if records.is_empty() {
        return Vec::new();
    }

    let max_second = records.iter().map(|r| r.timestamp_ms / 1000).max().unwrap_or(0);

    let mut cumulative_total = 0u64;
    let mut cumulative_hits = 0u64;
    let mut buckets = Vec::with_capacity(max_second as usize + 1);

    for second in 0..=max_second {
        let this_second: Vec<&RequestRecord> = records
            .iter()
            .filter(|r| r.timestamp_ms / 1000 == second)
            .collect();

        cumulative_total += this_second.len() as u64;
        cumulative_hits += this_second
            .iter()
            .filter(|r| matches!(r.source, RequestSource::LocalCache | RequestSource::PeerCache))
            .count() as u64;

        let avg_latency = if this_second.is_empty() {
            0.0
        } else {
            this_second.iter().map(|r| r.latency_ms).sum::<f64>() / this_second.len() as f64
        };
        let cache_hit_ratio = if cumulative_total > 0 {
            cumulative_hits as f64 / cumulative_total as f64 * 100.0
        } else {
            0.0
        };

        buckets.push(TimeSeriesBucket {
            second,
            avg_latency,
            cache_hit_ratio,
        });
    }

    buckets
}
