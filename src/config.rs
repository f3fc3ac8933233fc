use std::time::Duration;

use crate::error::{AppError, Result};

/// Sentinel address the ledger returns for a market slot that is not deployed.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// `yes_chance` is fixed-point on 0..1_000_000_000; dividing by this gives a percentage.
pub const CHANCE_SCALE: f64 = 10_000_000.0;

/// Minimum probability move (percentage points) that produces an activity record.
pub const ACTIVITY_THRESHOLD_PCT: f64 = 0.1;

/// Maximum activity records retained, newest first.
pub const ACTIVITY_LOG_CAPACITY: usize = 20;

/// Channel capacity for sync worker jobs.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Upper bound on `GetPaginatedVolume` pages walked for one market.
pub const VOLUME_MAX_PAGES: usize = 1_000;

/// Per-request timeout for the remote view gateway (seconds).
pub const RPC_TIMEOUT_SECS: u64 = 30;

/// Batch sizing defaults for `GetMarketsState`.
pub mod batch_defaults {
    pub const INITIAL: usize = 500;
    pub const MIN: usize = 20;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 1_000;
}

/// Knobs for the batch fetcher, split out so the engine can be built without env access.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub initial_batch_size: usize,
    pub min_batch_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            initial_batch_size: batch_defaults::INITIAL,
            min_batch_size: batch_defaults::MIN,
            max_retries: batch_defaults::MAX_RETRIES,
            retry_delay: Duration::from_millis(batch_defaults::RETRY_DELAY_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the ledger view gateway (MARKET_RPC_URL). None disables syncing.
    pub rpc_url: Option<String>,
    pub log_level: String,
    pub api_port: u16,
    /// Epoch length in seconds (EPOCH_SECS)
    pub epoch_secs: u64,
    pub fetch: FetchSettings,
    /// Records requested per `GetPaginatedVolume` page (VOLUME_PAGE_SIZE)
    pub volume_page_size: u64,
    /// Poll addresses loaded at start-up (TRACKED_POLLS, comma-separated).
    pub tracked_polls: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let initial_batch_size = parse_env("FETCH_INITIAL_BATCH", batch_defaults::INITIAL)?;
        let min_batch_size = parse_env("FETCH_MIN_BATCH", batch_defaults::MIN)?;
        if min_batch_size == 0 || min_batch_size > initial_batch_size {
            return Err(AppError::Config(
                "FETCH_MIN_BATCH must be between 1 and FETCH_INITIAL_BATCH".to_string(),
            ));
        }

        let epoch_secs = parse_env("EPOCH_SECS", 300u64)?;
        if epoch_secs == 0 {
            return Err(AppError::Config("EPOCH_SECS must be positive".to_string()));
        }

        Ok(Self {
            rpc_url: std::env::var("MARKET_RPC_URL")
                .ok()
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            epoch_secs,
            fetch: FetchSettings {
                initial_batch_size,
                min_batch_size,
                max_retries: parse_env("FETCH_MAX_RETRIES", batch_defaults::MAX_RETRIES)?,
                retry_delay: Duration::from_millis(parse_env(
                    "FETCH_RETRY_DELAY_MS",
                    batch_defaults::RETRY_DELAY_MS,
                )?),
            },
            volume_page_size: parse_env("VOLUME_PAGE_SIZE", 100u64)?.max(1),
            tracked_polls: std::env::var("TRACKED_POLLS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}
