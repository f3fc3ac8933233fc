//! In-memory `MarketReader` used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::config::ZERO_ADDRESS;
use crate::error::{AppError, Result};
use crate::remote::MarketReader;
use crate::types::{PollKey, RawMarketState, VolumePage, VolumeRecord};

pub fn live_slot(chance: u64, address: &str) -> RawMarketState {
    RawMarketState {
        is_live: true,
        total_value_locked: 1_000_000,
        yes_chance: chance,
        market_address: address.to_string(),
        collateral_token: "0xusdc".to_string(),
    }
}

pub fn empty_slot() -> RawMarketState {
    RawMarketState {
        is_live: false,
        total_value_locked: 0,
        yes_chance: 0,
        market_address: ZERO_ADDRESS.to_string(),
        collateral_token: ZERO_ADDRESS.to_string(),
    }
}

/// Scripted ledger. Every known key has an AMM market whose chance can be
/// changed between calls; unknown keys come back as two empty slots.
#[derive(Default)]
pub struct MockReader {
    amm_chances: Mutex<HashMap<PollKey, u64>>,
    /// Per-call failure script, consumed front to back. Empty = succeed.
    failures: Mutex<VecDeque<bool>>,
    /// Any batch larger than this is rejected, like an oversized RPC payload.
    max_accepted: Mutex<Option<usize>>,
    /// Keys of every `get_markets_state` call, in order.
    calls: Mutex<Vec<Vec<PollKey>>>,
    /// When armed, the next call parks until `release` is notified.
    hold_next: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
    volume: Mutex<HashMap<String, Vec<VolumeRecord>>>,
    volume_fail_offset: Mutex<Option<u64>>,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_chance(&self, key: &str, chance: u64) {
        self.amm_chances.lock().unwrap().insert(PollKey::new(key), chance);
    }

    pub fn script_failures(&self, script: &[bool]) {
        self.failures.lock().unwrap().extend(script.iter().copied());
    }

    pub fn reject_batches_over(&self, size: usize) {
        *self.max_accepted.lock().unwrap() = Some(size);
    }

    pub fn hold_next_call(&self) {
        self.hold_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Vec<PollKey>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_sizes(&self) -> Vec<usize> {
        self.calls().iter().map(Vec::len).collect()
    }

    pub fn set_volume(&self, market: &str, records: Vec<VolumeRecord>) {
        self.volume.lock().unwrap().insert(market.to_string(), records);
    }

    pub fn fail_volume_at(&self, offset: u64) {
        *self.volume_fail_offset.lock().unwrap() = Some(offset);
    }
}

#[async_trait]
impl MarketReader for MockReader {
    async fn get_markets_state(&self, keys: &[PollKey]) -> Result<Vec<RawMarketState>> {
        self.calls.lock().unwrap().push(keys.to_vec());

        if self.hold_next.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        let scripted_failure = self.failures.lock().unwrap().pop_front().unwrap_or(false);
        let oversized = self
            .max_accepted
            .lock()
            .unwrap()
            .is_some_and(|max| keys.len() > max);
        if scripted_failure || oversized {
            return Err(AppError::Remote(format!("rejected batch of {}", keys.len())));
        }

        let chances = self.amm_chances.lock().unwrap();
        Ok(keys
            .iter()
            .flat_map(|key| match chances.get(key) {
                Some(&chance) => [live_slot(chance, &format!("amm-{key}")), empty_slot()],
                None => [empty_slot(), empty_slot()],
            })
            .collect())
    }

    async fn get_paginated_volume(
        &self,
        market_address: &str,
        offset: u64,
        limit: u64,
    ) -> Result<VolumePage> {
        if *self.volume_fail_offset.lock().unwrap() == Some(offset) {
            return Err(AppError::Remote(format!("volume page at {offset} failed")));
        }
        let volume = self.volume.lock().unwrap();
        let all = volume.get(market_address).cloned().unwrap_or_default();
        let start = (offset as usize).min(all.len());
        let end = (start + limit as usize).min(all.len());
        Ok(VolumePage {
            records: all[start..end].to_vec(),
            has_more: end < all.len(),
        })
    }
}
