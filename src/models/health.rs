use chrono::{DateTime, Utc};
use serde::Serialize;

/// Read-only view of one scraper's run statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperHealthSnapshot {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_inserted: usize,
    pub total_inserted: u64,
    pub total_runs: u64,
    pub last_anomaly_count: usize,
    pub last_anomaly_summary: Option<String>,
}
