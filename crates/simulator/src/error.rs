//! The one fatal error a simulation run can report: a malformed config,
//! rejected before any peer, transport or origin state is created.

/// Raised by [`crate::SimulationConfig::validate`]. Everything past this
/// point in the pipeline (peer churn, transport timeouts, origin
/// rejections) is modeled behavior, not a crate-level error — it shows up
/// in [`p2psim_metrics::SimulationResults`] instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("num_peers must be at least 1, got {0}")]
    NumPeersInvalid(usize),
    #[error("duration_sec must be non-negative, got {0}")]
    DurationInvalid(f64),
    #[error("request_probability must be in [0, 1], got {0}")]
    RequestProbabilityInvalid(f64),
    #[error("churn_rate must be in [0, 1], got {0}")]
    ChurnRateInvalid(f64),
    #[error("device_heterogeneity bounds are inverted: min {min} > max {max}")]
    DeviceHeterogeneityInvalid { min: f64, max: f64 },
    #[error("join_rate must be positive when flash_crowd is enabled, got {0}")]
    JoinRateInvalid(f64),
}
