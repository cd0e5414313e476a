//! Per-scraper health tracking
//!
//! Each scraper owns one tracker. Runs mutate it; the admin surface reads
//! snapshots concurrently, so all state sits behind a single lock.

use chrono::Utc;
use parking_lot::Mutex;

use crate::models::health::ScraperHealthSnapshot;

#[derive(Debug, Default)]
pub struct ScraperHealthTracker {
    state: Mutex<ScraperHealthSnapshot>,
}

impl ScraperHealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run
    pub fn record_success(&self, inserted: usize, anomaly_count: usize, anomaly_summary: Option<String>) {
        let mut state = self.state.lock();
        state.last_success = Some(Utc::now());
        state.last_inserted = inserted;
        state.total_inserted += inserted as u64;
        state.consecutive_failures = 0;
        state.last_anomaly_count = anomaly_count;
        state.last_anomaly_summary = anomaly_summary.filter(|s| !s.trim().is_empty());
        state.total_runs += 1;
        state.last_error = None;
    }

    /// Record a failed run
    pub fn record_failure(&self, message: impl Into<String>) {
        let mut state = self.state.lock();
        state.last_failure = Some(Utc::now());
        state.last_error = Some(message.into());
        state.consecutive_failures += 1;
        state.total_runs += 1;
    }

    pub fn snapshot(&self) -> ScraperHealthSnapshot {
        self.state.lock().clone()
    }
}
