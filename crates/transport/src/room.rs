//! A named bucket of participants, modeling a WebRTC signaling room.

use p2psim_types::PeerId;

/// Per-participant link characteristics, set at `join` time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticipantLink {
    pub peer_id: PeerId,
    pub latency_ms: u64,
    pub bandwidth_mbps: f64,
}

/// An ordered list of participants sharing a room.
///
/// Order is insertion order (join order), matching the teacher's treatment
/// of membership views as ordered collections rather than sets — useful
/// here for round-robin assignment in the CDN baseline variant.
#[derive(Debug, Default, Clone)]
pub struct Room {
    participants: Vec<ParticipantLink>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, link: ParticipantLink) {
        if let Some(existing) = self.participants.iter_mut().find(|p| p.peer_id == link.peer_id) {
            *existing = link;
        } else {
            self.participants.push(link);
        }
    }

    pub fn remove(&mut self, peer_id: PeerId) {
        self.participants.retain(|p| p.peer_id != peer_id);
    }

    pub fn get(&self, peer_id: PeerId) -> Option<ParticipantLink> {
        self.participants.iter().copied().find(|p| p.peer_id == peer_id)
    }

    pub fn participants(&self) -> &[ParticipantLink] {
        &self.participants
    }
}
