pub mod change;

pub use change::detect_changes;
