//! Client-side cache of on-chain poll market states, kept fresh by batched,
//! self-throttling reads against a ledger view gateway.

pub mod api;
pub mod config;
pub mod detector;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod remote;
pub mod state;
pub mod types;
pub mod volume;

#[cfg(test)]
mod testing;

pub use engine::{Engine, SyncWorker};
pub use epoch::EpochScheduler;
pub use remote::{HttpMarketReader, MarketReader};
