//! Core data model for the p2psim content-distribution simulator.
//!
//! Provides the identifiers and value types shared by every other crate in
//! the workspace: the content hash used as a resource identifier, peer
//! identity, the resource/manifest pair a peer advertises, and the
//! value-copy snapshot (`PeerInfo`) one peer keeps of another.

mod hash;
mod manifest;
mod peer_info;
mod resource;
mod role;
mod telemetry;

pub use hash::{hash_bytes, ResourceHash};
pub use manifest::{Manifest, ManifestEntry};
pub use peer_info::PeerInfo;
pub use resource::Resource;
pub use role::Role;
pub use telemetry::{
    BandwidthTier, FileTransferEvent, PeerJoinEvent, RequestRecord, RequestSource,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation-local peer identity.
///
/// Real peers are addressed by cryptographic key in the production
/// protocol this simulator models; within a single simulation run a
/// compact integer is sufficient and keeps the hot paths (heap entries,
/// index lookups) allocation-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Construct a peer id from its raw index.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw index.
    pub fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}
