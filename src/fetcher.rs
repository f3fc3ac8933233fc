use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::FetchSettings;
use crate::error::{AppError, Result};
use crate::metrics::{LatencyStats, SyncHealth};
use crate::remote::MarketReader;
use crate::types::{MarketGroup, PollKey};

/// Outcome of one `BatchFetcher::fetch` run. Every input key is counted in
/// exactly one of `merged` or `abandoned`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub merged: usize,
    pub abandoned: Vec<PollKey>,
    pub calls: u32,
    pub failures: u32,
}

/// Batched `GetMarketsState` reader with adaptive sizing and bounded retry.
///
/// The batch size starts at `initial_batch_size`, halves on every failed call
/// and never drops below `min_batch_size`. It is remembered across runs and
/// does not grow back, so a gateway that rejects large payloads is only
/// probed once per engine lifetime.
pub struct BatchFetcher {
    reader: Arc<dyn MarketReader>,
    settings: FetchSettings,
    batch_size: AtomicUsize,
    health: Arc<SyncHealth>,
    latency: Arc<LatencyStats>,
}

impl BatchFetcher {
    pub fn new(
        reader: Arc<dyn MarketReader>,
        settings: FetchSettings,
        health: Arc<SyncHealth>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        let min = settings.min_batch_size.max(1);
        let initial = settings.initial_batch_size.max(min);
        health.set_batch_size(initial);
        Self {
            reader,
            settings: FetchSettings {
                initial_batch_size: initial,
                min_batch_size: min,
                ..settings
            },
            batch_size: AtomicUsize::new(initial),
            health,
            latency,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::Acquire)
    }

    /// Fetch `keys` in order, handing each completed sub-batch to `merge`.
    ///
    /// Never returns an error: once a run of failures exceeds `max_retries`,
    /// every key not yet merged is abandoned and reported.
    pub async fn fetch<F>(&self, keys: &[PollKey], mut merge: F) -> FetchReport
    where
        F: FnMut(&[PollKey], Vec<MarketGroup>),
    {
        let mut report = FetchReport::default();
        let mut remaining = keys;
        let mut attempts = 0u32;

        while !remaining.is_empty() {
            let size = self.batch_size().min(remaining.len());
            let batch = &remaining[..size];
            report.calls += 1;

            match self.fetch_batch(batch).await {
                Ok(groups) => {
                    merge(batch, groups);
                    report.merged += size;
                    remaining = &remaining[size..];
                    // Each new sub-batch gets a fresh retry budget.
                    attempts = 0;
                }
                Err(e) => {
                    report.failures += 1;
                    attempts += 1;
                    let next_size = self.shrink();

                    if attempts > self.settings.max_retries {
                        warn!(
                            abandoned = remaining.len(),
                            attempts,
                            batch_size = next_size,
                            "GetMarketsState failed after {attempts} attempts, abandoning {} keys: {e}",
                            remaining.len(),
                        );
                        report.abandoned.extend(remaining.iter().cloned());
                        break;
                    }

                    warn!(
                        batch = size,
                        next_batch = next_size,
                        attempt = attempts,
                        "GetMarketsState failed, retrying in {}ms: {e}",
                        self.settings.retry_delay.as_millis(),
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
            }
        }

        debug!(
            keys = keys.len(),
            merged = report.merged,
            abandoned = report.abandoned.len(),
            calls = report.calls,
            "batch fetch finished"
        );
        report
    }

    /// One remote call, paired into groups. A short or long response is a failure.
    async fn fetch_batch(&self, batch: &[PollKey]) -> Result<Vec<MarketGroup>> {
        let started = Instant::now();
        let result = self
            .reader
            .get_markets_state(batch)
            .await
            .and_then(|states| {
                if states.len() == batch.len() * 2 {
                    Ok(states)
                } else {
                    Err(AppError::Decode(format!(
                        "expected {} market slots for {} keys, got {}",
                        batch.len() * 2,
                        batch.len(),
                        states.len()
                    )))
                }
            });
        self.latency.record(started.elapsed());
        self.health.record_call(result.is_ok());

        let states = result?;
        let mut slots = states.into_iter();
        let mut groups = Vec::with_capacity(batch.len());
        while let (Some(amm), Some(pari_mutuel)) = (slots.next(), slots.next()) {
            groups.push(MarketGroup::from_wire(amm, pari_mutuel));
        }
        Ok(groups)
    }

    /// Halve the shared batch size, floored at `min_batch_size`. Returns the new size.
    fn shrink(&self) -> usize {
        let min = self.settings.min_batch_size;
        let previous = self
            .batch_size
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |size| {
                Some((size / 2).max(min))
            })
            .unwrap_or(min);
        let next = (previous / 2).max(min);
        self.health.set_batch_size(next);
        next
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
