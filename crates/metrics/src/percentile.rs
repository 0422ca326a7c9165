//! Nearest-rank percentiles over a pre-sorted sample.

/// `sorted[floor(q * n)]`, clamped to the last index. `sorted` must
/// already be ascending. Returns `0.0` for an empty sample rather than
/// `NaN` — callers treat an empty sample as "no data", not an error.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((q * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample_is_zero() {
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn median_of_ten() {
        let sorted: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert_eq!(percentile(&sorted, 0.5), 6.0);
    }

    #[test]
    fn p99_of_single_value() {
        assert_eq!(percentile(&[42.0], 0.99), 42.0);
    }
}
