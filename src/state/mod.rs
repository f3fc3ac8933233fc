pub mod activity;
pub mod market_store;
pub mod pending;

pub use activity::ActivityLog;
pub use market_store::StateStore;
pub use pending::PendingSet;
