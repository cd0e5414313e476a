use serde::{Deserialize, Serialize};

use crate::models::health::ScraperHealthSnapshot;

/// Query parameters for POST /admin/scrape/{source}
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeQuery {
    pub mode: Option<String>, // only "once" is supported
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub inserted: usize,
}

/// One entry of GET /admin/scrape/health
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub source: String,
    #[serde(flatten)]
    pub health: ScraperHealthSnapshot,
}

/// Query parameters for POST /admin/snapshot/daily
#[derive(Debug, Clone, Deserialize)]
pub struct DailySnapshotQuery {
    pub date: Option<String>, // YYYY-MM-DD, default: today in the configured timezone
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySnapshotResponse {
    pub date: String,
    pub status: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
