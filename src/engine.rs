use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{FetchSettings, CHANNEL_CAPACITY};
use crate::detector::detect_changes;
use crate::fetcher::{BatchFetcher, FetchReport};
use crate::metrics::{LatencyStats, SyncHealth};
use crate::remote::MarketReader;
use crate::state::{ActivityLog, PendingSet, StateStore};
use crate::types::{normalize_keys, ActivityRecord, MarketGroup, PollKey};

/// Work items for the sync worker. All remote fetching goes through this queue,
/// so at most one fetch pipeline runs at any moment.
#[derive(Debug)]
enum SyncJob {
    /// Drain the pending set as it stands when the job starts.
    Drain,
    /// Re-fetch the given keys regardless of cache or pending state.
    Refresh(Vec<PollKey>),
    /// Silent re-fetch of every cached key.
    EpochRefresh { tick: u64 },
}

/// State shared between the façade handles and the worker.
struct Shared {
    store: StateStore,
    pending: PendingSet,
    activity: ActivityLog,
    /// True while a `request_load` drain is queued or running. Silent refreshes never set it.
    loading: AtomicBool,
    tick: AtomicU64,
    /// Jobs queued plus the one running.
    in_flight: watch::Sender<usize>,
    health: Arc<SyncHealth>,
}

impl Shared {
    /// Apply one fetched sub-batch: detect moves against the cached values,
    /// overwrite the entries and append any activity.
    fn merge(&self, keys: &[PollKey], groups: Vec<MarketGroup>, release_pending: bool) {
        let observed_at_ns = now_ns();
        let mut records: Vec<ActivityRecord> = Vec::new();

        let batch: Vec<(PollKey, MarketGroup)> = keys.iter().cloned().zip(groups).collect();
        self.store.merge_with(batch, |key, previous, current| {
            records.extend(detect_changes(key, previous, current, observed_at_ns));
        });

        if release_pending {
            for key in keys {
                self.pending.release(key);
            }
        }

        self.health.record_merge(keys.len(), observed_at_ns);
        if !records.is_empty() {
            for r in &records {
                info!(
                    event = "ACTIVITY",
                    poll = %r.poll_key,
                    kind = %r.market_kind,
                    previous = r.previous_chance,
                    new = r.new_chance,
                    "chance moved {:+.2}pp on {} ({})",
                    r.delta, r.poll_key, r.market_kind,
                );
            }
            self.health.record_activity(records.len());
            self.activity.extend(records);
        }
    }

    fn finish_job(&self) {
        self.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

// ---------------------------------------------------------------------------
// Engine façade
// ---------------------------------------------------------------------------

/// Cloneable handle to the market-state cache. Every method returns
/// immediately; fetch results show up through `snapshot`, `activity` and `tick`.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<Shared>,
    /// None when no remote reader is configured: fetch operations become no-ops.
    jobs: Option<mpsc::Sender<SyncJob>>,
}

impl Engine {
    /// Build an engine and the worker that must be spawned to drive it.
    pub fn new(
        reader: Arc<dyn MarketReader>,
        settings: FetchSettings,
        health: Arc<SyncHealth>,
        latency: Arc<LatencyStats>,
    ) -> (Self, SyncWorker) {
        let shared = Self::shared(Arc::clone(&health));
        let (job_tx, job_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker = SyncWorker {
            shared: Arc::clone(&shared),
            fetcher: BatchFetcher::new(reader, settings, health, latency),
            jobs: job_rx,
        };
        (Self { shared, jobs: Some(job_tx) }, worker)
    }

    /// An engine with no remote endpoint. Loads and refreshes do nothing.
    pub fn disabled(health: Arc<SyncHealth>) -> Self {
        Self {
            shared: Self::shared(health),
            jobs: None,
        }
    }

    fn shared(health: Arc<SyncHealth>) -> Arc<Shared> {
        let (in_flight, _) = watch::channel(0usize);
        Arc::new(Shared {
            store: StateStore::new(),
            pending: PendingSet::new(),
            activity: ActivityLog::new(),
            loading: AtomicBool::new(false),
            tick: AtomicU64::new(0),
            in_flight,
            health,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.jobs.is_some()
    }

    /// Queue unseen keys and start a drain if none is running.
    ///
    /// Keys already cached or already pending are skipped. A drain that is
    /// already running does not pick up keys added after it started; they wait
    /// for the next call.
    pub fn request_load<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.jobs.is_none() {
            debug!("request_load ignored: no remote endpoint configured");
            return;
        }

        let mut added = 0usize;
        for key in normalize_keys(keys) {
            if self.shared.store.contains(&key) || self.shared.pending.contains(&key) {
                continue;
            }
            if self.shared.pending.insert(key) {
                added += 1;
            }
        }

        if self.shared.pending.is_empty() {
            return;
        }

        if self
            .shared
            .loading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(added, pending = self.shared.pending.len(), "load already running");
            return;
        }

        if !self.enqueue(SyncJob::Drain) {
            self.shared.loading.store(false, Ordering::Release);
        }
    }

    /// Re-fetch `keys` unconditionally.
    pub fn force_refresh<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.jobs.is_none() {
            debug!("force_refresh ignored: no remote endpoint configured");
            return;
        }
        let keys = normalize_keys(keys);
        if !keys.is_empty() {
            self.enqueue(SyncJob::Refresh(keys));
        }
    }

    /// Remove every cached entry whose key is not in `keep`. Returns the number removed.
    pub fn trim<I, S>(&self, keep: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keep: HashSet<PollKey> = normalize_keys(keep).into_iter().collect();
        let removed = self.shared.store.trim(&keep);
        if removed > 0 {
            debug!(removed, kept = self.shared.store.len(), "trimmed cache");
        }
        removed
    }

    pub fn snapshot(&self) -> HashMap<PollKey, MarketGroup> {
        self.shared.store.snapshot()
    }

    pub fn get(&self, key: &str) -> Option<MarketGroup> {
        self.shared.store.get(&PollKey::new(key))
    }

    pub fn tick(&self) -> u64 {
        self.shared.tick.load(Ordering::Acquire)
    }

    /// Most recent activity first.
    pub fn activity(&self) -> Vec<ActivityRecord> {
        self.shared.activity.recent()
    }

    /// True while a `request_load` drain is queued or running.
    pub fn is_loading(&self) -> bool {
        self.shared.loading.load(Ordering::Acquire)
    }

    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    pub fn cached_len(&self) -> usize {
        self.shared.store.len()
    }

    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.borrow()
    }

    /// Resolves once no job is queued or running.
    pub async fn idle(&self) {
        let mut rx = self.shared.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Epoch boundary: bump the tick, then queue a silent refresh of the whole
    /// cache unless a fetch is already in flight. A skipped refresh is not deferred.
    pub(crate) fn on_epoch(&self) -> u64 {
        let tick = self.shared.tick.fetch_add(1, Ordering::AcqRel) + 1;

        if self.jobs.is_none() || self.shared.store.is_empty() {
            return tick;
        }

        let in_flight = self.in_flight();
        if in_flight > 0 {
            debug!(tick, in_flight, "fetch in flight, skipping epoch refresh");
            self.shared.health.record_epoch(false);
            return tick;
        }

        if self.enqueue(SyncJob::EpochRefresh { tick }) {
            self.shared.health.record_epoch(true);
        }
        tick
    }

    fn enqueue(&self, job: SyncJob) -> bool {
        let Some(jobs) = &self.jobs else {
            return false;
        };
        self.shared.in_flight.send_modify(|n| *n += 1);
        match jobs.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                self.shared.finish_job();
                warn!("sync job dropped: {e}");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SyncWorker
// ---------------------------------------------------------------------------

/// Serialized consumer of `SyncJob`s. Owns the batch fetcher.
pub struct SyncWorker {
    shared: Arc<Shared>,
    fetcher: BatchFetcher,
    jobs: mpsc::Receiver<SyncJob>,
}

impl SyncWorker {
    pub async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            match job {
                SyncJob::Drain => self.drain().await,
                SyncJob::Refresh(keys) => {
                    let report = self.fetch(&keys, false).await;
                    debug!(keys = keys.len(), merged = report.merged, "forced refresh done");
                }
                SyncJob::EpochRefresh { tick } => {
                    let keys = self.shared.store.keys();
                    let report = self.fetch(&keys, false).await;
                    info!(
                        tick,
                        keys = keys.len(),
                        merged = report.merged,
                        abandoned = report.abandoned.len(),
                        batch_size = self.fetcher.batch_size(),
                        "epoch refresh complete",
                    );
                }
            }
            self.shared.finish_job();
        }
        debug!("sync job channel closed, worker exiting");
    }

    async fn drain(&self) {
        let keys = self.shared.pending.snapshot();
        let report = self.fetch(&keys, true).await;
        for key in &report.abandoned {
            self.shared.pending.release(key);
        }
        self.shared.loading.store(false, Ordering::Release);

        let waiting = self.shared.pending.len();
        info!(
            keys = keys.len(),
            merged = report.merged,
            abandoned = report.abandoned.len(),
            waiting,
            "load drained",
        );
    }

    async fn fetch(&self, keys: &[PollKey], release_pending: bool) -> FetchReport {
        if keys.is_empty() {
            return FetchReport::default();
        }
        let shared = &self.shared;
        let report = self
            .fetcher
            .fetch(keys, |batch, groups| shared.merge(batch, groups, release_pending))
            .await;
        if !report.abandoned.is_empty() {
            shared.health.record_abandoned(report.abandoned.len());
        }
        report
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
