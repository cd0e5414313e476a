#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gold_tracker::AppState;
use gold_tracker::config::{ConflictPolicy, SourceConfig};
use gold_tracker::models::price::{CanonicalPriceTick, DailySnapshot, DayChange, StoredTick, TickFilter};
use gold_tracker::repositories::memory::MemoryStore;
use gold_tracker::repositories::{RepoError, TickRepository};
use gold_tracker::scrapers::fetch::{FetchError, HttpFetcher};
use gold_tracker::scrapers::price_scraper::PriceScraper;
use gold_tracker::scrapers::{Scraper, ScraperRegistry, SourceKind};
use gold_tracker::services::normalizer::PriceNormalizer;
use gold_tracker::shutdown::Cancellation;

pub const TZ: chrono_tz::Tz = chrono_tz::Asia::Ho_Chi_Minh;

/// Serves the same canned body on every request
pub struct StubFetcher {
    body: Result<String, FetchError>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn ok(body: &str) -> Self {
        Self {
            body: Ok(body.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            body: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetcher for StubFetcher {
    async fn get(&self, _url: &str, _timeout: Duration) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.body.clone()
    }
}

/// Tick repository that counts insert calls before delegating
pub struct RecordingTicks {
    inner: Arc<MemoryStore>,
    inserts: Mutex<Vec<CanonicalPriceTick>>,
}

impl RecordingTicks {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            inserts: Mutex::new(Vec::new()),
        }
    }

    pub fn inserts(&self) -> Vec<CanonicalPriceTick> {
        self.inserts.lock().clone()
    }
}

#[async_trait]
impl TickRepository for RecordingTicks {
    async fn insert(&self, tick: &CanonicalPriceTick) -> Result<bool, RepoError> {
        self.inserts.lock().push(tick.clone());
        self.inner.insert(tick).await
    }

    async fn latest(&self, filter: &TickFilter) -> Result<Vec<StoredTick>, RepoError> {
        self.inner.latest(filter).await
    }

    async fn history(&self, filter: &TickFilter, since: NaiveDate) -> Result<Vec<DailySnapshot>, RepoError> {
        self.inner.history(filter, since).await
    }

    async fn day_over_day(&self, filter: &TickFilter) -> Result<Vec<DayChange>, RepoError> {
        self.inner.day_over_day(filter).await
    }
}

pub fn memory_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(TZ, ConflictPolicy::DoNothing))
}

pub fn fast_config(kind: SourceKind) -> SourceConfig {
    let mut config = SourceConfig::defaults(kind);
    config.retry_count = 2;
    config.retry_base_delay = Duration::from_millis(1);
    config
}

/// Scraper for `kind` wired to `store`, serving `fetcher` payloads
pub fn build_scraper(
    kind: SourceKind,
    fetcher: Arc<StubFetcher>,
    store: Arc<MemoryStore>,
    ticks: Arc<dyn TickRepository>,
) -> Arc<PriceScraper> {
    let normalizer = Arc::new(PriceNormalizer::new(store.clone(), store));
    Arc::new(PriceScraper::new(kind, fast_config(kind), fetcher, normalizer, ticks))
}

pub fn build_app_state(scrapers: Vec<Arc<dyn Scraper>>, store: Arc<MemoryStore>) -> AppState {
    AppState {
        registry: Arc::new(ScraperRegistry::new(scrapers)),
        snapshots: store,
        timezone: TZ,
        cancel: Cancellation::none(),
    }
}
