//! Content-backed origin: pairs [`OriginServer`]'s admission/latency model
//! with the actual bytes a cache miss falls back to fetching.
//!
//! The state-machine in `lib.rs` only ever answers "would the origin admit
//! and serve this request, and how long would that take" — it has no idea
//! what a "file" is. Every peer's request pipeline needs the reconstructed
//! [`Resource`] too, so this thin layer publishes resources by path once
//! (at simulation setup) and looks them up after `OriginServer` grants
//! admission.

use crate::{OriginConfig, OriginServer};
use p2psim_types::Resource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Outcome of a content-level origin fetch, folding in the underlying
/// [`crate::OriginOutcome`]'s latency/success.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginFetchOutcome {
    pub resource: Option<Resource>,
    pub latency_ms: f64,
    pub successful: bool,
}

/// Shared origin: concurrency/queueing model plus a simple path->resource
/// store. One instance per simulation run.
pub struct OriginModel {
    server: Arc<OriginServer>,
    content: RwLock<HashMap<String, Resource>>,
}

impl OriginModel {
    pub fn new(config: OriginConfig) -> Arc<Self> {
        Arc::new(Self {
            server: OriginServer::new(config),
            content: RwLock::new(HashMap::new()),
        })
    }

    /// Publish (or replace) the resource served at `path`.
    pub async fn publish(&self, path: impl Into<String>, resource: Resource) {
        self.content.write().await.insert(path.into(), resource);
    }

    /// The underlying concurrency/queueing model, for diagnostics or
    /// wiring a baseline variant (e.g. a CDN edge's own miss path) to the
    /// same admission control.
    pub fn server(&self) -> &Arc<OriginServer> {
        &self.server
    }

    /// Fetch `path`, modeling admission, queueing and load-dependent
    /// latency before looking up the content. A request that is admitted
    /// but finds nothing published at `path` is reported unsuccessful with
    /// the admission latency still charged — this should not happen in a
    /// correctly wired simulation (the driver publishes the target file
    /// before any peer loop starts) but is not a panic-worthy condition.
    pub async fn fetch(&self, path: &str) -> OriginFetchOutcome {
        let outcome = self.server.handle_request().await;
        if !outcome.success {
            return OriginFetchOutcome {
                resource: None,
                latency_ms: outcome.arrival_to_completion_ms,
                successful: false,
            };
        }

        let resource = self.content.read().await.get(path).cloned();
        OriginFetchOutcome {
            successful: resource.is_some(),
            latency_ms: outcome.arrival_to_completion_ms,
            resource,
        }
    }
}
