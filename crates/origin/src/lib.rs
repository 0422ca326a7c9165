//! Origin server model: the dominant contention point under a flash crowd.
//!
//! A single shared, concurrency-limited server with a bounded FIFO wait
//! queue and load-dependent processing latency. Every peer's request
//! pipeline falls back here on a cache/peer miss, so this is the one
//! resource every concurrent peer loop in the simulation contends on.

mod content;

pub use content::{OriginFetchOutcome, OriginModel};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace};

/// Immediate-rejection latency reported when the wait queue is already full.
pub const QUEUE_FULL_LATENCY_MS: f64 = 10.0;

/// Origin server tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginConfig {
    pub base_latency_ms: f64,
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub request_timeout_ms: u64,
}

impl OriginConfig {
    /// Flash-crowd preset: a tighter concurrency cap, the scenario this
    /// simulator exists to stress-test.
    pub fn flash_crowd() -> Self {
        Self {
            base_latency_ms: 20.0,
            max_concurrent: 20,
            max_queue_size: 100,
            request_timeout_ms: 30_000,
        }
    }

    /// Steady-state preset: a more generously provisioned origin.
    pub fn steady() -> Self {
        Self {
            max_concurrent: 40,
            ..Self::flash_crowd()
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self::flash_crowd()
    }
}

/// Outcome of one origin request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OriginOutcome {
    pub arrival_to_completion_ms: f64,
    pub success: bool,
}

impl OriginOutcome {
    fn rejected(latency_ms: f64) -> Self {
        Self {
            arrival_to_completion_ms: latency_ms,
            success: false,
        }
    }
}

struct OriginState {
    active: usize,
    queue: VecDeque<oneshot::Sender<()>>,
}

/// Shared origin server, cloned (cheaply, via `Arc` internally) into every
/// peer's request pipeline.
pub struct OriginServer {
    config: OriginConfig,
    state: Mutex<OriginState>,
}

impl OriginServer {
    pub fn new(config: OriginConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(OriginState {
                active: 0,
                queue: VecDeque::new(),
            }),
        })
    }

    pub fn config(&self) -> OriginConfig {
        self.config
    }

    /// Current number of requests being served. For diagnostics/tests only
    /// — the invariant `active <= max_concurrent` always holds.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active
    }

    /// Current FIFO wait-queue depth. For diagnostics/tests only — the
    /// invariant `queue.len() <= max_queue_size` always holds.
    pub async fn queue_depth(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Handle one request end to end: admission, queueing, processing.
    pub async fn handle_request(&self) -> OriginOutcome {
        let arrived_at = Instant::now();

        let granted_immediately = {
            let mut state = self.state.lock().await;
            if state.active < self.config.max_concurrent {
                state.active += 1;
                true
            } else if state.queue.len() >= self.config.max_queue_size {
                debug!(
                    queue_len = state.queue.len(),
                    "origin queue full, rejecting immediately"
                );
                return OriginOutcome::rejected(QUEUE_FULL_LATENCY_MS);
            } else {
                false
            }
        };

        if !granted_immediately {
            let (tx, rx) = oneshot::channel();
            {
                let mut state = self.state.lock().await;
                state.queue.push_back(tx);
            }
            let timeout = Duration::from_millis(self.config.request_timeout_ms);
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(())) => {
                    trace!("origin admitted queued request");
                }
                _ => {
                    return OriginOutcome::rejected(self.config.request_timeout_ms as f64);
                }
            }
        }

        let load = {
            let state = self.state.lock().await;
            state.active as f64 / self.config.max_concurrent as f64
        };
        let processing_ms = if load <= 0.8 {
            self.config.base_latency_ms
        } else {
            self.config.base_latency_ms * (1.0 + (load - 0.8) * 5.0)
        };
        tokio::time::sleep(Duration::from_secs_f64(processing_ms / 1000.0)).await;

        {
            let mut state = self.state.lock().await;
            state.active -= 1;
            Self::release_next(&mut state);
        }

        OriginOutcome {
            arrival_to_completion_ms: arrived_at.elapsed().as_secs_f64() * 1000.0,
            success: true,
        }
    }

    /// Wake the FIFO head, handing it the slot that was just freed. If the
    /// waiter already timed out and dropped its receiver, the slot is
    /// handed to the next one instead — a timed-out waiter must never hold
    /// a phantom slot.
    fn release_next(state: &mut OriginState) {
        while let Some(tx) = state.queue.pop_front() {
            state.active += 1;
            if tx.send(()).is_ok() {
                return;
            }
            state.active -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_immediately_under_capacity() {
        let origin = OriginServer::new(OriginConfig {
            base_latency_ms: 20.0,
            max_concurrent: 2,
            max_queue_size: 10,
            request_timeout_ms: 1_000,
        });
        let outcome = origin.handle_request().await;
        assert!(outcome.success);
        assert_eq!(origin.active_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn active_never_exceeds_max_concurrent() {
        let origin = OriginServer::new(OriginConfig {
            base_latency_ms: 50.0,
            max_concurrent: 2,
            max_queue_size: 10,
            request_timeout_ms: 5_000,
        });

        let mut handles = Vec::new();
        for _ in 0..5 {
            let origin = Arc::clone(&origin);
            handles.push(tokio::spawn(async move { origin.handle_request().await }));
            tokio::task::yield_now().await;
        }
        // Give the scheduler a chance to admit the first wave before we
        // assert on the snapshot.
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(origin.active_count().await <= 2);

        for h in handles {
            let _ = h.await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_when_queue_is_full() {
        let origin = OriginServer::new(OriginConfig {
            base_latency_ms: 1_000.0,
            max_concurrent: 1,
            max_queue_size: 1,
            request_timeout_ms: 10_000,
        });

        let o1 = Arc::clone(&origin);
        let h1 = tokio::spawn(async move { o1.handle_request().await });
        tokio::task::yield_now().await;

        let o2 = Arc::clone(&origin);
        let h2 = tokio::spawn(async move { o2.handle_request().await });
        tokio::task::yield_now().await;

        // Third request should see a full queue (1 active, 1 queued) and
        // be rejected immediately.
        let outcome = origin.handle_request().await;
        assert!(!outcome.success);
        assert_eq!(outcome.arrival_to_completion_ms, QUEUE_FULL_LATENCY_MS);

        tokio::time::advance(Duration::from_secs(2)).await;
        let _ = h1.await;
        let _ = h2.await;
    }

    #[tokio::test(start_paused = true)]
    async fn queued_request_times_out_past_request_timeout() {
        let origin = OriginServer::new(OriginConfig {
            base_latency_ms: 50_000.0, // never finishes before the timeout
            max_concurrent: 1,
            max_queue_size: 1,
            request_timeout_ms: 100,
        });

        let o1 = Arc::clone(&origin);
        let h1 = tokio::spawn(async move { o1.handle_request().await });
        tokio::task::yield_now().await;

        let outcome = origin.handle_request().await;
        assert!(!outcome.success);
        assert_eq!(outcome.arrival_to_completion_ms, 100.0);

        h1.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn load_above_80_percent_degrades_latency() {
        // With max_concurrent = 5, a 5th concurrent admission sits at
        // load = 1.0, so processing should be 20 * (1 + 0.2*5) = 40ms.
        let origin = OriginServer::new(OriginConfig {
            base_latency_ms: 20.0,
            max_concurrent: 5,
            max_queue_size: 10,
            request_timeout_ms: 10_000,
        });

        let mut handles = Vec::new();
        for _ in 0..4 {
            let origin = Arc::clone(&origin);
            handles.push(tokio::spawn(async move { origin.handle_request().await }));
        }
        tokio::task::yield_now().await;

        let outcome = origin.handle_request().await;
        assert!(outcome.success);
        assert!((outcome.arrival_to_completion_ms - 40.0).abs() < 1.0);

        for h in handles {
            let _ = h.await;
        }
    }
}
