//! Inputs to one simulation run.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Device-parameter spread peers are drawn from at join time.
///
/// Defaults (10-250 ms latency, 10-100 Mbps bandwidth) match typical
/// fixed/mobile broadband heterogeneity, per spec.md 4.6.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceHeterogeneity {
    pub latency_min_ms: u64,
    pub latency_max_ms: u64,
    pub bandwidth_min_mbps: f64,
    pub bandwidth_max_mbps: f64,
}

impl Default for DeviceHeterogeneity {
    fn default() -> Self {
        Self {
            latency_min_ms: 10,
            latency_max_ms: 250,
            bandwidth_min_mbps: 10.0,
            bandwidth_max_mbps: 100.0,
        }
    }
}

/// How churn removes and/or replaces peers during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChurnMode {
    /// Peers leave; the swarm only shrinks.
    Leaving,
    /// New peers join up to the original cap; nobody leaves on their own.
    Joining,
    /// Both: a leaving peer may be replaced, up to the cap.
    Mixed,
}

impl Default for ChurnMode {
    fn default() -> Self {
        ChurnMode::Leaving
    }
}

/// Number of CDN edge caches in [`BaselineVariant::Cdn`] when unspecified.
pub const DEFAULT_CDN_EDGES: usize = 3;

/// Baseline variants share the driver and metrics aggregator but resolve
/// requests without running the full peer request pipeline. `None` (the
/// absence of this field in [`SimulationConfig`]) means the ordinary
/// peer-assisted simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BaselineVariant {
    /// Every request is routed to the origin; no caching anywhere.
    OriginOnly,
    /// `edges` simple edge caches, peers assigned round-robin.
    Cdn { edges: usize },
    /// Single-owner consistent-hash assignment with a hop-cost lookup and
    /// a one-time rehash penalty on owner departure.
    Dht { avg_hops: f64, rehash_cost_ms: f64 },
}

impl BaselineVariant {
    pub fn cdn_default() -> Self {
        BaselineVariant::Cdn {
            edges: DEFAULT_CDN_EDGES,
        }
    }

    pub fn dht_default() -> Self {
        BaselineVariant::Dht {
            avg_hops: 3.0,
            rehash_cost_ms: 50.0,
        }
    }
}

/// Tick granularity for the per-peer request/churn loop.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 100;

/// All inputs to one simulation run.
///
/// `request_interval_ms` is a deprecated alias for `request_probability`:
/// when set, the effective per-tick probability is derived as
/// `min(1, 1000 / interval)` rather than read directly from
/// `request_probability` (spec.md 4.6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub num_peers: usize,
    pub target_path: String,
    pub duration_sec: f64,
    pub request_probability: f64,
    pub request_interval_ms: Option<f64>,
    pub churn_rate: f64,
    pub churn_mode: ChurnMode,
    pub flash_crowd: bool,
    pub join_rate: f64,
    pub anchor_signaling_latency_ms: u64,
    pub device_heterogeneity: DeviceHeterogeneity,
    pub file_size_bytes: Option<u64>,
    pub baseline_mode: Option<BaselineVariant>,
    /// Seeds the deterministic RNG driving device-parameter assignment,
    /// request rolls and churn rolls. Two runs with identical config and
    /// seed produce identical `SimulationResults` event logs.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_peers: 10,
            target_path: "/target-file".to_string(),
            duration_sec: 30.0,
            request_probability: 0.1,
            request_interval_ms: None,
            churn_rate: 0.0,
            churn_mode: ChurnMode::default(),
            flash_crowd: false,
            join_rate: 5.0,
            anchor_signaling_latency_ms: 100,
            device_heterogeneity: DeviceHeterogeneity::default(),
            file_size_bytes: None,
            baseline_mode: None,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// The configured request probability, resolving the deprecated
    /// `request_interval_ms` alias if present. This is `requestProbability`
    /// as named in spec.md 4.6 — a per-unit-time figure, not yet scaled to
    /// any particular tick granularity. Callers driving a tick loop should
    /// use [`Self::per_tick_request_probability`] instead.
    pub fn effective_request_probability(&self) -> f64 {
        match self.request_interval_ms {
            Some(interval_ms) if interval_ms > 0.0 => (1000.0 / interval_ms).min(1.0),
            _ => self.request_probability,
        }
    }

    /// The probability of firing a request on a single [`DEFAULT_CHECK_INTERVAL_MS`]
    /// tick: `requestProbability * checkInterval/1000`, per spec.md 4.6 step 3.
    pub fn per_tick_request_probability(&self) -> f64 {
        self.effective_request_probability() * (DEFAULT_CHECK_INTERVAL_MS as f64 / 1000.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_peers == 0 {
            return Err(ConfigError::NumPeersInvalid(self.num_peers));
        }
        if self.duration_sec < 0.0 {
            return Err(ConfigError::DurationInvalid(self.duration_sec));
        }
        if !(0.0..=1.0).contains(&self.request_probability) {
            return Err(ConfigError::RequestProbabilityInvalid(self.request_probability));
        }
        if !(0.0..=1.0).contains(&self.churn_rate) {
            return Err(ConfigError::ChurnRateInvalid(self.churn_rate));
        }
        let dh = &self.device_heterogeneity;
        if dh.latency_min_ms > dh.latency_max_ms || dh.bandwidth_min_mbps > dh.bandwidth_max_mbps {
            return Err(ConfigError::DeviceHeterogeneityInvalid {
                min: dh.latency_min_ms as f64,
                max: dh.latency_max_ms as f64,
            });
        }
        if self.flash_crowd && self.join_rate <= 0.0 {
            return Err(ConfigError::JoinRateInvalid(self.join_rate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimulationConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_peers() {
        let config = SimulationConfig {
            num_peers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let config = SimulationConfig {
            request_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn request_interval_alias_derives_probability() {
        let config = SimulationConfig {
            request_interval_ms: Some(2_000.0),
            ..Default::default()
        };
        assert_eq!(config.effective_request_probability(), 0.5);
    }

    #[test]
    fn request_interval_alias_clamps_to_one() {
        let config = SimulationConfig {
            request_interval_ms: Some(100.0),
            ..Default::default()
        };
        assert_eq!(config.effective_request_probability(), 1.0);
    }

    #[test]
    fn flash_crowd_requires_positive_join_rate() {
        let config = SimulationConfig {
            flash_crowd: true,
            join_rate: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
