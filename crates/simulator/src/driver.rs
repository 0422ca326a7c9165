//! The simulation driver: builds peers, schedules joins, runs per-peer
//! request/churn loops concurrently, and hands recorded telemetry to the
//! metrics aggregator once every loop has ended.

use crate::config::{ChurnMode, DEFAULT_CHECK_INTERVAL_MS};
use crate::error::ConfigError;
use crate::SimulationConfig;
use bytes::Bytes;
use p2psim_metrics::{FinalizeContext, MetricsAggregator, SimulationResults};
use p2psim_origin::{OriginConfig, OriginModel};
use p2psim_peer::{Peer, PeerConfig, PeerRegistry};
use p2psim_transport::{ChunkProvider, MockTransport, ParticipantLink};
use p2psim_types::{hash_bytes, PeerId, PeerJoinEvent, Resource, ResourceHash};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default content size when `SimulationConfig::file_size_bytes` is unset.
pub const DEFAULT_FILE_SIZE_BYTES: u64 = 1_048_576;

const RECOVERY_WINDOW_MS: u64 = 5_000;
const POLL_INTERVAL_MS: u64 = 10;

/// Run a peer-assisted simulation (or dispatch to a baseline variant) and
/// return the finalized results.
pub async fn run(config: SimulationConfig) -> Result<SimulationResults, ConfigError> {
    config.validate()?;
    if let Some(variant) = config.baseline_mode {
        return Ok(crate::baseline::run_baseline(config, variant).await);
    }
    Ok(run_peer_assisted(config).await)
}

/// Everything the per-peer tasks and the join-scheduler task share.
struct SimState {
    config: SimulationConfig,
    transport: Arc<MockTransport>,
    origin: Arc<OriginModel>,
    registry: Arc<PeerRegistry>,
    metrics: Arc<MetricsAggregator>,
    target_hash: ResourceHash,
    rng: StdMutex<Pcg64>,
    start: Instant,
    end_ms: u64,
    active_tasks: AtomicUsize,
    next_peer_id: AtomicU64,
    churn_leaves: StdMutex<Vec<u64>>,
}

impl SimState {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn record_churn_leave(&self, now_ms: u64) {
        self.churn_leaves
            .lock()
            .expect("churn log mutex poisoned")
            .push(now_ms);
    }

    async fn issue_request(&self, peer: &Arc<Peer>, hash: ResourceHash, now_ms: u64) {
        let result = peer
            .request_resource(hash, now_ms, &self.origin, &self.config.target_path)
            .await;
        self.metrics.record_request(result.record.clone());
        if let Some(event) = result.transfer_event {
            self.metrics.record_transfer(event);
        }
        if result.resource.is_some() && result.record.successful {
            self.broadcast_info(peer, now_ms).await;
        }
    }

    /// Cross-seed every other live peer's index with `peer`'s latest
    /// manifest, standing in for the periodic `addPeer` refresh the driver
    /// performs after any successful fetch (spec.md 4.6 step 3).
    async fn broadcast_info(&self, peer: &Arc<Peer>, now_ms: u64) {
        let info = peer.info_snapshot(now_ms).await;
        for other in self.registry.all().await {
            if other.peer_id() != peer.peer_id() {
                other.add_peer(info.clone()).await;
            }
        }
    }
}

/// Increments/decrements `SimState::active_tasks` for the lifetime of one
/// spawned task, so the driver's completion wait also covers churn
/// replacement peers spawned after the initial batch.
struct ActiveTaskGuard(Arc<SimState>);

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        self.0.active_tasks.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) fn bernoulli(rng: &StdMutex<Pcg64>, p: f64) -> bool {
    if p <= 0.0 {
        return false;
    }
    if p >= 1.0 {
        return true;
    }
    rng.lock().expect("rng mutex poisoned").gen_bool(p)
}

/// `(bandwidth_mbps, latency_ms, uptime_budget_sec)` for the `index`-th of
/// `total` peers, per spec.md 4.6 step 1.
pub(crate) fn device_params(
    rng: &StdMutex<Pcg64>,
    index: usize,
    total: usize,
    heterogeneity: &crate::config::DeviceHeterogeneity,
) -> (f64, u64, f64) {
    let span = (heterogeneity.latency_max_ms - heterogeneity.latency_min_ms) as f64;
    let spread = span * 0.05;
    let base =
        heterogeneity.latency_min_ms as f64 + (index as f64 / total.max(1) as f64) * span;
    let jitter = if spread > 0.0 {
        rng.lock().expect("rng mutex poisoned").gen_range(-spread..=spread)
    } else {
        0.0
    };
    let latency_ms = (base + jitter).max(10.0) as u64;

    let bandwidth_mbps = rng
        .lock()
        .expect("rng mutex poisoned")
        .gen_range(heterogeneity.bandwidth_min_mbps..=heterogeneity.bandwidth_max_mbps);
    let uptime_budget_sec = rng.lock().expect("rng mutex poisoned").gen_range(30.0..=300.0);

    (bandwidth_mbps, latency_ms, uptime_budget_sec)
}

pub(crate) fn make_content(size: usize) -> Bytes {
    Bytes::from((0..size).map(|i| (i % 256) as u8).collect::<Vec<u8>>())
}

async fn run_peer_assisted(config: SimulationConfig) -> SimulationResults {
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
            Resource::new(content, "application/octet-stream", 0.0),
        )
        .await;

    let end_ms = (config.duration_sec.max(0.0) * 1000.0).round() as u64;
    let seed = config.seed;
    let per_tick_request_probability = config.per_tick_request_probability();

    let state = Arc::new(SimState {
        transport: MockTransport::new(),
        origin,
        registry: PeerRegistry::new(),
        metrics: Arc::new(MetricsAggregator::new()),
        target_hash,
        rng: StdMutex::new(Pcg64::seed_from_u64(seed)),
        start: Instant::now(),
        end_ms,
        active_tasks: AtomicUsize::new(0),
        next_peer_id: AtomicU64::new(0),
        churn_leaves: StdMutex::new(Vec::new()),
        config: config.clone(),
    });

    for i in 0..config.num_peers {
        let peer_id = PeerId::new(state.next_peer_id.fetch_add(1, Ordering::SeqCst));
        let (bandwidth_mbps, latency_ms, uptime_budget_sec) =
            device_params(&state.rng, i, config.num_peers, &config.device_heterogeneity);
        let join_delay_ms = if config.flash_crowd {
            ((i as f64 / config.join_rate) * 1000.0).round() as u64 + config.anchor_signaling_latency_ms
        } else {
            0
        };
        spawn_peer(
            Arc::clone(&state),
            peer_id,
            bandwidth_mbps,
            latency_ms,
            join_delay_ms,
            config.flash_crowd,
            uptime_budget_sec,
            per_tick_request_probability,
        );
    }

    if matches!(config.churn_mode, ChurnMode::Joining | ChurnMode::Mixed) {
        spawn_join_scheduler(Arc::clone(&state), per_tick_request_probability);
    }

    while state.active_tasks.load(Ordering::SeqCst) > 0 {
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }

    let now_ms = state.now_ms();
    let live_peers = state.registry.all().await;
    for peer in &live_peers {
        peer.update_connections(now_ms).await;
    }
    let anchor_nodes: Vec<PeerId> = live_peers
        .iter()
        .filter(|p| p.role().is_anchor())
        .map(|p| p.peer_id())
        .collect();

    let recovery_speed = compute_recovery_speed(&state);
    let churn_events = if config.churn_rate > 0.0
        || matches!(config.churn_mode, ChurnMode::Joining | ChurnMode::Mixed)
    {
        Some(state.churn_leaves.lock().expect("churn log mutex poisoned").len() as u64)
    } else {
        None
    };

    state.metrics.finalize(FinalizeContext {
        peers_simulated: config.num_peers,
        duration_sec: config.duration_sec,
        anchor_nodes,
        churn_events,
        recovery_speed,
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_peer(
    state: Arc<SimState>,
    peer_id: PeerId,
    bandwidth_mbps: f64,
    latency_ms: u64,
    join_delay_ms: u64,
    joined_via_anchor: bool,
    uptime_budget_sec: f64,
    per_tick_request_probability: f64,
) {
    state.active_tasks.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        let _guard = ActiveTaskGuard(Arc::clone(&state));
        run_peer_loop(
            state,
            peer_id,
            bandwidth_mbps,
            latency_ms,
            join_delay_ms,
            joined_via_anchor,
            uptime_budget_sec,
            per_tick_request_probability,
        )
        .await;
    });
}

#[allow(clippy::too_many_arguments)]
async fn run_peer_loop(
    state: Arc<SimState>,
    peer_id: PeerId,
    bandwidth_mbps: f64,
    latency_ms: u64,
    join_delay_ms: u64,
    joined_via_anchor: bool,
    uptime_budget_sec: f64,
    per_tick_request_probability: f64,
) {
    if join_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(join_delay_ms)).await;
    }
    if state.now_ms() >= state.end_ms {
        return;
    }

    let peer_config = PeerConfig::in_memory(bandwidth_mbps, latency_ms);
    let role_update_ticks = (peer_config.role_update_interval_ms / DEFAULT_CHECK_INTERVAL_MS).max(1);
    let peer = Peer::new(
        peer_id,
        peer_config,
        Arc::clone(&state.transport),
        Arc::clone(&state.registry),
        join_delay_ms,
    );

    state
        .transport
        .join(
            "swarm",
            ParticipantLink {
                peer_id,
                latency_ms,
                bandwidth_mbps,
            },
            Arc::clone(&peer) as Arc<dyn ChunkProvider>,
        )
        .await;
    state.registry.register(Arc::clone(&peer)).await;
    state.metrics.record_join(PeerJoinEvent {
        peer_id,
        timestamp_ms: join_delay_ms,
        joined_via_anchor,
    });
    trace!(%peer_id, join_delay_ms, "peer joined swarm");

    let mut tick: u64 = 0;
    loop {
        if state.now_ms() >= state.end_ms {
            break;
        }
        tokio::time::sleep(Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS)).await;
        tick += 1;
        let now_ms = state.now_ms();
        if now_ms >= state.end_ms {
            break;
        }

        if bernoulli(&state.rng, per_tick_request_probability) {
            state.issue_request(&peer, state.target_hash, now_ms).await;
        }

        if tick % role_update_ticks == 0 {
            peer.update_role(now_ms);
            if let Some(candidate) = peer.auto_fetch_candidate(now_ms).await {
                state.issue_request(&peer, candidate, now_ms).await;
            }
        }

        let churn_eligible = matches!(state.config.churn_mode, ChurnMode::Leaving | ChurnMode::Mixed);
        let should_leave = churn_eligible
            && (bernoulli(&state.rng, state.config.churn_rate)
                || peer.uptime_sec(now_ms) >= uptime_budget_sec);
        if should_leave {
            peer.disconnect().await;
            state.registry.unregister(peer_id).await;
            state.record_churn_leave(now_ms);
            debug!(%peer_id, now_ms, "peer churned out");
            break;
        }
    }
}

/// Drives churn-driven replacement joins for `ChurnMode::Joining` and
/// `ChurnMode::Mixed`: every tick, with probability `churn_rate`, spawns a
/// fresh peer if the swarm is below `num_peers`.
fn spawn_join_scheduler(state: Arc<SimState>, per_tick_request_probability: f64) {
    state.active_tasks.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        let _guard = ActiveTaskGuard(Arc::clone(&state));
        loop {
            if state.now_ms() >= state.end_ms {
                break;
            }
            tokio::time::sleep(Duration::from_millis(DEFAULT_CHECK_INTERVAL_MS)).await;
            if state.now_ms() >= state.end_ms {
                break;
            }

            if !bernoulli(&state.rng, state.config.churn_rate) {
                continue;
            }
            if state.registry.len().await >= state.config.num_peers {
                continue;
            }

            let peer_id = PeerId::new(state.next_peer_id.fetch_add(1, Ordering::SeqCst));
            let (bandwidth_mbps, latency_ms, uptime_budget_sec) = device_params(
                &state.rng,
                peer_id.index() as usize,
                state.config.num_peers,
                &state.config.device_heterogeneity,
            );
            spawn_peer(
                Arc::clone(&state),
                peer_id,
                bandwidth_mbps,
                latency_ms,
                0,
                false,
                uptime_budget_sec,
                per_tick_request_probability,
            );
        }
    });
}

fn compute_recovery_speed(state: &SimState) -> Option<f64> {
    let leaves = state.churn_leaves.lock().expect("churn log mutex poisoned").clone();
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
