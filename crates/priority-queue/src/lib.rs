//! Array-backed max-heap of `(reputation, PeerId)`, the structure each
//! peer's `chunkIndex` uses to pick the best provider for a resource hash.
//!
//! Indexed 1-based with a sentinel at index 0 carrying key `+infinity`, so
//! the usual `parent = i/2`, `children = 2i, 2i+1` arithmetic never needs a
//! bounds check against index 0. A `PeerId -> index` side map turns
//! `delete_peer`/`update_value` from the straightforward O(n) linear scan
//! into O(log n), since both are called on every retry of the request
//! pipeline and peer departures are frequent under churn.

use p2psim_types::PeerId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    key: f64,
    peer_id: PeerId,
}

/// Max-heap of peers ordered by reputation.
#[derive(Debug, Clone)]
pub struct ReputationQueue {
    // heap[0] is the sentinel; real entries start at index 1.
    heap: Vec<Entry>,
    index_of: HashMap<PeerId, usize>,
}

impl Default for ReputationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ReputationQueue {
    pub fn new() -> Self {
        Self {
            heap: vec![Entry {
                key: f64::INFINITY,
                peer_id: PeerId::new(u64::MAX),
            }],
            index_of: HashMap::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.heap.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, peer_id: PeerId) -> bool {
        self.index_of.contains_key(&peer_id)
    }

    /// Insert a new peer, or update its key if already present.
    pub fn insert(&mut self, key: f64, peer_id: PeerId) {
        if let Some(&idx) = self.index_of.get(&peer_id) {
            self.set_key(idx, key);
            return;
        }
        self.heap.push(Entry { key, peer_id });
        let idx = self.heap.len() - 1;
        self.index_of.insert(peer_id, idx);
        self.sift_up(idx);
    }

    /// Update an existing peer's key; a no-op if the peer isn't present.
    pub fn update_value(&mut self, peer_id: PeerId, new_key: f64) {
        if let Some(&idx) = self.index_of.get(&peer_id) {
            self.set_key(idx, new_key);
        }
    }

    /// Remove a peer from the queue, wherever it sits.
    pub fn delete_peer(&mut self, peer_id: PeerId) {
        let Some(&idx) = self.index_of.get(&peer_id) else {
            return;
        };
        self.remove_at(idx);
    }

    /// Peek the peer with the largest key, without removing it.
    pub fn peek_max(&self) -> Option<PeerId> {
        if self.is_empty() {
            None
        } else {
            Some(self.heap[1].peer_id)
        }
    }

    /// Remove and return the peer with the largest key.
    pub fn delete_max(&mut self) -> Option<PeerId> {
        if self.is_empty() {
            return None;
        }
        let max = self.heap[1].peer_id;
        self.remove_at(1);
        Some(max)
    }

    fn set_key(&mut self, idx: usize, new_key: f64) {
        let old_key = self.heap[idx].key;
        self.heap[idx].key = new_key;
        if new_key > old_key {
            self.sift_up(idx);
        } else if new_key < old_key {
            self.sift_down(idx);
        }
    }

    fn remove_at(&mut self, idx: usize) {
        let last = self.heap.len() - 1;
        self.index_of.remove(&self.heap[idx].peer_id);
        if idx == last {
            self.heap.pop();
            return;
        }
        self.heap.swap(idx, last);
        self.index_of.insert(self.heap[idx].peer_id, idx);
        self.heap.pop();

        if idx < self.heap.len() {
            let parent = idx / 2;
            if parent >= 1 && self.heap[parent].key < self.heap[idx].key {
                self.sift_up(idx);
            } else {
                self.sift_down(idx);
            }
        }
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 1 {
            let parent = idx / 2;
            if self.heap[parent].key < self.heap[idx].key {
                self.swap(parent, idx);
                idx = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.heap.len();
        loop {
            let left = idx * 2;
            let right = left + 1;
            let mut largest = idx;
            if left < len && self.heap[left].key > self.heap[largest].key {
                largest = left;
            }
            if right < len && self.heap[right].key > self.heap[largest].key {
                largest = right;
            }
            if largest == idx {
                break;
            }
            self.swap(idx, largest);
            idx = largest;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index_of.insert(self.heap[a].peer_id, a);
        self.index_of.insert(self.heap[b].peer_id, b);
    }
}
