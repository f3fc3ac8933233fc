pub mod health;
pub mod latency;

pub use health::{HealthSnapshot, SyncHealth};
pub use latency::{LatencyStats, LatencySummary};
