//! Peer role, assigned by reputation with hysteresis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A peer's role in the swarm.
///
/// Anchors are long-lived, signaling-capable helpers; transients are
/// everyone else. Transitions use hysteresis (see `p2psim-peer`) so a
/// peer hovering near the threshold doesn't flap every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Anchor,
    Transient,
}

impl Role {
    pub fn is_anchor(self) -> bool {
        matches!(self, Role::Anchor)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Transient
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Anchor => write!(f, "anchor"),
            Role::Transient => write!(f, "transient"),
        }
    }
}
