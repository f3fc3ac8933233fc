use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{MarketGroup, PollKey};

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// poll key → latest fetched market group.
///
/// A whole sub-batch is merged under one write lock, so `snapshot()` sees
/// either none or all of a batch. Writes go through `merge_with` and `trim` only.
#[derive(Debug, Default)]
pub struct StateStore {
    groups: RwLock<HashMap<PollKey, MarketGroup>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PollKey, MarketGroup>> {
        self.groups.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PollKey, MarketGroup>> {
        self.groups.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &PollKey) -> bool {
        self.read().contains_key(key)
    }

    pub fn get(&self, key: &PollKey) -> Option<MarketGroup> {
        self.read().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Cached keys in sorted order, so full refreshes walk the cache deterministically.
    pub fn keys(&self) -> Vec<PollKey> {
        let mut keys: Vec<PollKey> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn snapshot(&self) -> HashMap<PollKey, MarketGroup> {
        self.read().clone()
    }

    /// Overwrite every entry in `batch`. `observe` sees the previous value (if
    /// any) next to the incoming one before it is replaced, under the same lock.
    pub fn merge_with<F>(&self, batch: Vec<(PollKey, MarketGroup)>, mut observe: F)
    where
        F: FnMut(&PollKey, Option<&MarketGroup>, &MarketGroup),
    {
        let mut groups = self.write();
        for (key, group) in batch {
            observe(&key, groups.get(&key), &group);
            groups.insert(key, group);
        }
    }

    /// Drop every entry not named in `keep`. Returns how many were removed.
    pub fn trim(&self, keep: &HashSet<PollKey>) -> usize {
        let mut groups = self.write();
        let before = groups.len();
        groups.retain(|key, _| keep.contains(key));
        before - groups.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
