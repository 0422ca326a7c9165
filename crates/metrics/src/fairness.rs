//! Jain's fairness index over per-peer upload counts.

/// `(sum x)^2 / (n * sum x^2)`. `1.0` when every value is equal, `1/n` at
/// maximum disparity (one peer does all the work), `0.0` for an empty
/// sample or when every value is zero (no uploads served by anyone).
pub fn jain_fairness_index(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().sum();
    if sum == 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = values.iter().map(|v| v * v).sum();
    (sum * sum) / (values.len() as f64 * sum_sq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(jain_fairness_index(&[]), 0.0);
    }

    #[test]
    fn all_zero_is_zero() {
        assert_eq!(jain_fairness_index(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn equal_uploads_is_perfectly_fair() {
        assert_eq!(jain_fairness_index(&[5.0, 5.0, 5.0, 5.0]), 1.0);
    }

    #[test]
    fn single_peer_doing_everything_is_one_over_n() {
        let values = [10.0, 0.0, 0.0, 0.0];
        assert!((jain_fairness_index(&values) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn bounded_between_zero_and_one() {
        let values = [1.0, 2.0, 3.0, 50.0, 0.5];
        let index = jain_fairness_index(&values);
        assert!((0.0..=1.0).contains(&index));
    }
}
