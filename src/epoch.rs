use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::Engine;

/// Fires on every wall-clock epoch boundary for the lifetime of the engine.
///
/// Each firing bumps the engine tick exactly once and, when no fetch is in
/// flight, queues a silent refresh of every cached poll. Consumers watch the
/// tick to know when to re-list polls for the new epoch.
pub struct EpochScheduler {
    engine: Engine,
    epoch_secs: u64,
}

impl EpochScheduler {
    pub fn new(engine: Engine, epoch_secs: u64) -> Self {
        Self {
            engine,
            epoch_secs: epoch_secs.max(1),
        }
    }

    pub async fn run(self) {
        let period = Duration::from_secs(self.epoch_secs);
        let first = until_next_boundary(unix_now(), self.epoch_secs);
        let mut ticker = interval_at(Instant::now() + first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            epoch_secs = self.epoch_secs,
            epoch = epoch_number(unix_now().as_secs(), self.epoch_secs),
            "epoch scheduler started, first boundary in {}ms",
            first.as_millis(),
        );

        loop {
            ticker.tick().await;
            self.fire();
        }
    }

    fn fire(&self) -> u64 {
        let tick = self.engine.on_epoch();
        debug!(
            tick,
            epoch = epoch_number(unix_now().as_secs(), self.epoch_secs),
            cached = self.engine.cached_len(),
            "epoch tick",
        );
        tick
    }
}

/// Index of the epoch containing `unix_secs`.
pub fn epoch_number(unix_secs: u64, epoch_secs: u64) -> u64 {
    unix_secs / epoch_secs.max(1)
}

/// Time until the next multiple of `epoch_secs` after `now`; in `(0, epoch_secs]`.
pub fn until_next_boundary(now: Duration, epoch_secs: u64) -> Duration {
    let period_ms = u128::from(epoch_secs.max(1)) * 1_000;
    let into_epoch = now.as_millis() % period_ms;
    Duration::from_millis((period_ms - into_epoch) as u64)
}

fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
