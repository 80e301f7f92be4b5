//! Per-peer message counters with bulk flush.
//!
//! Entries are created lazily on first receipt and the whole map is cleared
//! at once on each flush tick. Memory is bounded by window length, not by
//! peer churn; there is no per-entry expiry and no persistence.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::addr::NodeId;

/// Count of messages received per peer in the current window.
/// Safe to share across tasks; a single lock guards the map.
#[derive(Debug, Default)]
pub struct PeerMessageCounter {
    counts: Mutex<HashMap<NodeId, u16>>,
}

impl PeerMessageCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the peer's counter and return the post-increment count.
    /// Saturates instead of wrapping.
    pub fn increment(&self, id: NodeId) -> u16 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(id).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Current count for the peer; 0 if no message was received this window.
    pub fn count(&self, id: &NodeId) -> u16 {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(id).copied().unwrap_or(0)
    }

    /// Reset all counters at once.
    pub fn flush(&self) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.clear();
    }

    /// Number of peers seen this window.
    pub fn len(&self) -> usize {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_by_one_per_call() {
        let counter = PeerMessageCounter::new();
        let id = NodeId::random();
        assert_eq!(counter.increment(id), 1);
        assert_eq!(counter.increment(id), 2);
        assert_eq!(counter.increment(id), 3);
        assert_eq!(counter.count(&id), 3);
    }

    #[test]
    fn peers_are_independent() {
        let counter = PeerMessageCounter::new();
        let a = NodeId::random();
        let b = NodeId::random();
        counter.increment(a);
        counter.increment(a);
        counter.increment(b);
        assert_eq!(counter.count(&a), 2);
        assert_eq!(counter.count(&b), 1);
    }

    #[test]
    fn unknown_peer_counts_zero() {
        let counter = PeerMessageCounter::new();
        assert_eq!(counter.count(&NodeId::random()), 0);
    }

    #[test]
    fn flush_resets_all_peers_at_once() {
        let counter = PeerMessageCounter::new();
        let a = NodeId::random();
        let b = NodeId::random();
        counter.increment(a);
        counter.increment(b);
        assert_eq!(counter.len(), 2);
        counter.flush();
        assert!(counter.is_empty());
        assert_eq!(counter.count(&a), 0);
        assert_eq!(counter.count(&b), 0);
    }
}
