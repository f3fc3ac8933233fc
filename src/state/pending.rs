use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashSet;

use crate::types::PollKey;

/// Keys that are queued for, or currently inside, a drain run.
///
/// A key leaves the set exactly once: on merge or on abandonment. Membership
/// checks go through the `DashSet`; `order` remembers insertion order and is
/// only touched under its lock, so both stay in step.
#[derive(Debug, Default)]
pub struct PendingSet {
    keys: DashSet<PollKey>,
    order: Mutex<VecDeque<PollKey>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn order(&self) -> MutexGuard<'_, VecDeque<PollKey>> {
        self.order.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if the key was not already pending.
    pub fn insert(&self, key: PollKey) -> bool {
        let mut order = self.order();
        if !self.keys.insert(key.clone()) {
            return false;
        }
        order.push_back(key);
        true
    }

    pub fn contains(&self, key: &PollKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns true if this call released the key.
    pub fn release(&self, key: &PollKey) -> bool {
        let mut order = self.order();
        if self.keys.remove(key).is_none() {
            return false;
        }
        if let Some(pos) = order.iter().position(|k| k == key) {
            order.remove(pos);
        }
        true
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Point-in-time copy in insertion order.
    pub fn snapshot(&self) -> Vec<PollKey> {
        self.order().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_deduplicated() {
        let pending = PendingSet::new();
        assert!(pending.insert(PollKey::new("0xa")));
        assert!(!pending.insert(PollKey::new("0xA")));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.snapshot(), vec![PollKey::new("0xa")]);
    }

    #[test]
    fn release_happens_once() {
        let pending = PendingSet::new();
        let key = PollKey::new("0xa");
        pending.insert(key.clone());
        assert!(pending.release(&key));
        assert!(!pending.release(&key));
        assert!(pending.is_empty());
        assert!(pending.snapshot().is_empty());
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let pending = PendingSet::new();
        for key in ["0xc", "0xa", "0xb", "0xd"] {
            pending.insert(PollKey::new(key));
        }
        pending.release(&PollKey::new("0xb"));
        pending.insert(PollKey::new("0xb"));

        assert_eq!(
            pending.snapshot(),
            ["0xc", "0xa", "0xd", "0xb"].map(PollKey::new).to_vec()
        );
    }
}
