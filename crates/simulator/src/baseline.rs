//! Baseline variants: origin-only, a simple CDN edge-cache layer, and a
//! single-owner DHT lookup. Each shares the driver's tick loop shape and
//! [`MetricsAggregator`] but skips the full peer request pipeline — these
//! are comparison points for the peer-assisted simulation, not protocol
//! implementations in their own right.

use crate::config::{BaselineVariant, DeviceHeterogeneity, DEFAULT_CHECK_INTERVAL_MS};
use crate::driver::{bernoulli, device_params, make_content, DEFAULT_FILE_SIZE_BYTES};
use crate::SimulationConfig;
use p2psim_metrics::{FinalizeContext, MetricsAggregator};
use p2psim_origin::{OriginConfig, OriginModel};
use p2psim_types::{hash_bytes, PeerId, RequestRecord, RequestSource};
use rand_pcg::Pcg64;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::time::Instant;

/// Fixed per-hop latency a DHT lookup is charged for each hop traversed.
const DHT_HOP_LATENCY_MS: f64 = 10.0;
/// Fixed latency a CDN edge adds on a cache hit, on top of the client's
/// own network latency to the edge.
const CDN_EDGE_LATENCY_MS: f64 = 5.0;
const POLL_INTERVAL_MS: u64 = 10;

enum VariantState {
    OriginOnly,
    Cdn {
        edges_have_content: Vec<StdMutex<bool>>,
    },
    Dht {
        owner_has_content: AtomicBool,
        pending_rehash: AtomicBool,
        rehash_count: AtomicU64,
    },
}

struct BaselineState {
    config: SimulationConfig,
    origin: Arc<OriginModel>,
    metrics: Arc<MetricsAggregator>,
    target_hash: p2psim_types::ResourceHash,
    rng: StdMutex<Pcg64>,
    start: Instant,
    end_ms: u64,
    active_tasks: AtomicUsize,
    variant: VariantState,
    churn_leaves: StdMutex<Vec<u64>>,
}

impl BaselineState {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

pub async fn run_baseline(config: SimulationConfig, variant: BaselineVariant) -> p2psim_metrics::SimulationResults {
    let origin_config = if config.flash_crowd {
        OriginConfig::flash_crowd()
    } else {
        OriginConfig::steady()
    };
    let origin = OriginModel::new(origin_config);
    let content = make_content(config.file_size_bytes.unwrap_or(DEFAULT_FILE_SIZE_BYTES) as usize);
    let target_hash = hash_bytes(&content);
    origin
        .publish(
            config.target_path.clone(),
            p2psim_types::Resource::new(content, "application/octet-stream", 0.0),
        )
        .await;

    let variant_state = match variant {
        BaselineVariant::OriginOnly => VariantState::OriginOnly,
        BaselineVariant::Cdn { edges } => VariantState::Cdn {
            edges_have_content: (0..edges.max(1)).map(|_| StdMutex::new(false)).collect(),
        },
        BaselineVariant::Dht { .. } => VariantState::Dht {
            owner_has_content: AtomicBool::new(false),
            pending_rehash: AtomicBool::new(false),
            rehash_count: AtomicU64::new(0),
        },
    };

    let end_ms = (config.duration_sec.max(0.0) * 1000.0).round() as u64;
    let state = Arc::new(BaselineState {
        origin,
        metrics: Arc::new(MetricsAggregator::new()),
        target_hash,
        rng: StdMutex::new(Pcg64::seed_from_u64(config.seed)),
        start: Instant::now(),
        end_ms,
        active_tasks: AtomicUsize::new(0),
        variant: variant_state,
        churn_leaves: StdMutex::new(Vec::new()),
        config: config.clone(),
    });

    let per_tick_request_probability = config.per_tick_request_probability();
    for i in 0..config.num_peers {
        spawn_client(Arc::clone(&state), i, variant, per_tick_request_probability);
    }

    while state.active_tasks.load(Ordering::SeqCst) > 0 {
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }

    let recovery_speed = compute_recovery_speed(&state);
    let rehash_count = match &state.variant {
        VariantState::Dht { rehash_count, .. } => Some(rehash_count.load(Ordering::SeqCst)),
        _ => None,
    };
    let churn_events = rehash_count.or_else(|| {
        (config.churn_rate > 0.0).then(|| state.churn_leaves.lock().expect("churn mutex poisoned").len() as u64)
    });

    state.metrics.finalize(FinalizeContext {
        peers_simulated: config.num_peers,
        duration_sec: config.duration_sec,
        anchor_nodes: Vec::new(),
        churn_events,
        recovery_speed,
    })
}

fn spawn_client(state: Arc<BaselineState>, index: usize, variant: BaselineVariant, per_tick_request_probability: f64) {
    state.active_tasks.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        run_client_loop(Arc::clone(&state), index, variant, per_tick_request_probability).await;
        state.active_tasks.fetch_sub(1, Ordering::SeqCst);
    });
}

async fn run_client_loop(
    state: Arc<BaselineState>,
    index: usize,
    variant: BaselineVariant,
    per_tick_request_probability: f64,
) {
    let peer_id = PeerId::new(index as u64);
    let (bandwidth_mbps, latency_ms, _uptime_budget_sec) =
        device_params(&state.rng, index, state.config.num_peers, &device_heterogeneity(&state));

    while state.now_ms() < state.end_ms {
        tokio::time::sleep(Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS)).await;
        let now_ms = state.now_ms();
        if now_ms >= state.end_ms {
            break;
        }

        if !bernoulli(&state.rng, per_tick_request_probability) {
            continue;
        }

        let (resolved_latency_ms, source, successful) =
            resolve_request(&state, variant, peer_id, latency_ms, now_ms).await;

        state.metrics.record_request(RequestRecord {
            timestamp_ms: now_ms,
            latency_ms: resolved_latency_ms,
            source,
            peer_id,
            peer_bandwidth_mbps: bandwidth_mbps,
            peer_bandwidth_tier: p2psim_types::BandwidthTier::classify(bandwidth_mbps),
            successful,
            is_anchor: false,
        });

        if matches!(variant, BaselineVariant::Dht { .. }) {
            maybe_churn_owner(&state, now_ms);
        }
    }
}

fn device_heterogeneity(state: &BaselineState) -> DeviceHeterogeneity {
    state.config.device_heterogeneity
}

async fn resolve_request(
    state: &BaselineState,
    variant: BaselineVariant,
    peer_id: PeerId,
    client_latency_ms: u64,
    now_ms: u64,
) -> (f64, RequestSource, bool) {
    match variant {
        BaselineVariant::OriginOnly => {
            let outcome = state.origin.fetch(&state.config.target_path).await;
            (
                outcome.latency_ms + client_latency_ms as f64,
                RequestSource::Origin,
                outcome.successful,
            )
        }
        BaselineVariant::Cdn { edges } => {
            let VariantState::Cdn { edges_have_content } = &state.variant else {
                unreachable!("variant state must match the requested variant")
            };
            let edge_index = (peer_id.index() as usize) % edges.max(1);
            let had_content = {
                let mut has_content = edges_have_content[edge_index].lock().expect("edge mutex poisoned");
                let had = *has_content;
                *has_content = true;
                had
            };
            if had_content {
                (
                    CDN_EDGE_LATENCY_MS + client_latency_ms as f64,
                    RequestSource::PeerCache,
                    true,
                )
            } else {
                let outcome = state.origin.fetch(&state.config.target_path).await;
                (
                    outcome.latency_ms + client_latency_ms as f64,
                    RequestSource::Origin,
                    outcome.successful,
                )
            }
        }
        BaselineVariant::Dht { avg_hops, rehash_cost_ms } => {
            let VariantState::Dht {
                owner_has_content,
                pending_rehash,
                ..
            } = &state.variant
            else {
                unreachable!("variant state must match the requested variant")
            };
            let _ = now_ms;
            let had_content = owner_has_content.swap(true, Ordering::SeqCst);
            if had_content {
                let rehash_penalty = if pending_rehash.swap(false, Ordering::SeqCst) {
                    rehash_cost_ms
                } else {
                    0.0
                };
                (
                    avg_hops * DHT_HOP_LATENCY_MS + rehash_penalty + client_latency_ms as f64,
                    RequestSource::PeerCache,
                    true,
                )
            } else {
                let outcome = state.origin.fetch(&state.config.target_path).await;
                (
                    outcome.latency_ms + client_latency_ms as f64,
                    RequestSource::Origin,
                    outcome.successful,
                )
            }
        }
    }
}

fn maybe_churn_owner(state: &BaselineState, now_ms: u64) {
    let VariantState::Dht {
        owner_has_content,
        pending_rehash,
        rehash_count,
    } = &state.variant
    else {
        return;
    };
    if state.config.churn_rate <= 0.0 || !bernoulli(&state.rng, state.config.churn_rate) {
        return;
    }
    if owner_has_content.swap(false, Ordering::SeqCst) {
        pending_rehash.store(true, Ordering::SeqCst);
        rehash_count.fetch_add(1, Ordering::SeqCst);
        state.churn_leaves.lock().expect("churn mutex poisoned").push(now_ms);
    }
}

const RECOVERY_WINDOW_MS: u64 = 5_000;

fn compute_recovery_speed(state: &BaselineState) -> Option<f64> {
    let leaves = state.churn_leaves.lock().expect("churn mutex poisoned").clone();
    if leaves.is_empty() {
        return None;
    }
    let records = state.metrics.requests_snapshot();
    let mut ratios = Vec::new();
    for &t in &leaves {
        let before = records
            .iter()
            .filter(|r| r.timestamp_ms < t && r.timestamp_ms + RECOVERY_WINDOW_MS >= t)
            .count();
        if before == 0 {
            continue;
        }
        let after = records
            .iter()
            .filter(|r| r.timestamp_ms >= t && r.timestamp_ms < t + RECOVERY_WINDOW_MS)
            .count();
        let rate_before = before as f64 / (RECOVERY_WINDOW_MS as f64 / 1000.0);
        let rate_after = after as f64 / (RECOVERY_WINDOW_MS as f64 / 1000.0);
        ratios.push(rate_after / rate_before);
    }
    if ratios.is_empty() {
        None
    } else {
        Some(ratios.iter().sum::<f64>() / ratios.len() as f64)
    }
}
