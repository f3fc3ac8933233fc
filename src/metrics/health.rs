//! Shared sync counters for the /health endpoint.
//! Updated by the batch fetcher, the sync worker and the epoch scheduler.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Lifetime counters. Writers bump them, the API reads a `HealthSnapshot`.
#[derive(Default)]
pub struct SyncHealth {
    remote_calls: AtomicU64,
    remote_failures: AtomicU64,
    keys_merged: AtomicU64,
    keys_abandoned: AtomicU64,
    activity_emitted: AtomicU64,
    epoch_refreshes: AtomicU64,
    epoch_skips: AtomicU64,
    /// Current adaptive batch size of the fetcher.
    batch_size: AtomicUsize,
    /// Nanosecond timestamp of the last merged sub-batch (0 = none).
    last_merge_at_ns: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub remote_calls: u64,
    pub remote_failures: u64,
    pub keys_merged: u64,
    pub keys_abandoned: u64,
    pub activity_emitted: u64,
    pub epoch_refreshes: u64,
    pub epoch_skips: u64,
    pub batch_size: usize,
    pub last_merge_at_ns: u64,
}

impl SyncHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call(&self, ok: bool) {
        self.remote_calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.remote_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_merge(&self, keys: usize, at_ns: u64) {
        self.keys_merged.fetch_add(keys as u64, Ordering::Relaxed);
        self.last_merge_at_ns.store(at_ns, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self, keys: usize) {
        self.keys_abandoned.fetch_add(keys as u64, Ordering::Relaxed);
    }

    pub fn record_activity(&self, records: usize) {
        self.activity_emitted.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_epoch(&self, refreshed: bool) {
        let counter = if refreshed { &self.epoch_refreshes } else { &self.epoch_skips };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_batch_size(&self, size: usize) {
        self.batch_size.store(size, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            remote_calls: self.remote_calls.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            keys_merged: self.keys_merged.load(Ordering::Relaxed),
            keys_abandoned: self.keys_abandoned.load(Ordering::Relaxed),
            activity_emitted: self.activity_emitted.load(Ordering::Relaxed),
            epoch_refreshes: self.epoch_refreshes.load(Ordering::Relaxed),
            epoch_skips: self.epoch_skips.load(Ordering::Relaxed),
            batch_size: self.batch_size.load(Ordering::Relaxed),
            last_merge_at_ns: self.last_merge_at_ns.load(Ordering::Relaxed),
        }
    }
}
