use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use crate::config::ACTIVITY_LOG_CAPACITY;
use crate::types::ActivityRecord;

/// Most-recent-first feed of probability moves, capped at `capacity` entries.
#[derive(Debug)]
pub struct ActivityLog {
    capacity: usize,
    inner: Mutex<VecDeque<ActivityRecord>>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::with_capacity(ACTIVITY_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Records are pushed in observation order; the newest ends up at the front
    /// and the oldest fall off the back.
    pub fn extend(&self, records: impl IntoIterator<Item = ActivityRecord>) {
        let mut feed = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            feed.push_front(record);
        }
        feed.truncate(self.capacity);
    }

    pub fn recent(&self) -> Vec<ActivityRecord> {
        let feed = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        feed.iter().cloned().collect()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}
