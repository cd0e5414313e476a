use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::fetch::{FetchError, HttpFetcher, fetch_with_retry};
use super::{Scraper, SourceKind};
use crate::config::SourceConfig;
use crate::models::health::ScraperHealthSnapshot;
use crate::models::price::RawPriceRecord;
use crate::repositories::TickRepository;
use crate::services::health::ScraperHealthTracker;
use crate::services::normalizer::PriceNormalizer;
use crate::shutdown::Cancellation;

/// Fetch -> parse -> filter -> normalize -> insert for one source.
///
/// The parser is picked by `kind`; everything else is shared.
pub struct PriceScraper {
    kind: SourceKind,
    config: SourceConfig,
    fetcher: Arc<dyn HttpFetcher>,
    normalizer: Arc<PriceNormalizer>,
    ticks: Arc<dyn TickRepository>,
    health: ScraperHealthTracker,
}

#[derive(Debug, Default)]
struct BatchOutcome {
    inserted: usize,
    anomalies: Vec<String>,
}

impl BatchOutcome {
    fn summary(&self) -> Option<String> {
        let mut distinct: Vec<&str> = Vec::new();
        for reason in &self.anomalies {
            if !distinct.contains(&reason.as_str()) {
                distinct.push(reason);
            }
        }

        (!distinct.is_empty()).then(|| distinct.join(" | "))
    }
}

impl PriceScraper {
    pub fn new(
        kind: SourceKind,
        config: SourceConfig,
        fetcher: Arc<dyn HttpFetcher>,
        normalizer: Arc<PriceNormalizer>,
        ticks: Arc<dyn TickRepository>,
    ) -> Self {
        Self {
            kind,
            config,
            fetcher,
            normalizer,
            ticks,
            health: ScraperHealthTracker::new(),
        }
    }

    async fn fetch(&self, cancel: &Cancellation) -> Result<String, FetchError> {
        debug!(source = %self.kind, url = %self.config.price_url, "Fetching prices");

        fetch_with_retry(
            self.fetcher.as_ref(),
            &self.config.price_url,
            self.config.timeout,
            self.config.retry_count,
            self.config.retry_base_delay,
            cancel,
        )
        .await
    }

    async fn ingest(&self, records: Vec<RawPriceRecord>, cancel: &Cancellation) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for raw in records {
            if cancel.is_cancelled() {
                warn!(source = %self.kind, "Run cancelled mid-batch");
                break;
            }

            if let Some(reason) = self.config.filter.is_anomalous(&raw) {
                warn!(source = %self.kind, record = %raw.context(), %reason, "Skipping record due to anomaly");
                outcome.anomalies.push(reason);
                continue;
            }

            let tick = match self.normalizer.normalize(&raw).await {
                Ok(tick) => tick,
                Err(e) => {
                    warn!(source = %self.kind, record = %raw.context(), error = %e, "Failed to normalize record");
                    outcome.anomalies.push(format!("normalize:{}:{}", raw.context(), e.kind()));
                    continue;
                }
            };

            match self.ticks.insert(&tick).await {
                Ok(true) => outcome.inserted += 1,
                Ok(false) => {
                    debug!(source = %self.kind, record = %raw.context(), effective_at = %tick.effective_at(), "Tick already stored");
                }
                Err(e) => {
                    warn!(source = %self.kind, record = %raw.context(), error = %e, "Failed to insert tick");
                    outcome.anomalies.push(format!("insert:{}:{}", raw.context(), e.kind()));
                }
            }
        }

        outcome
    }
}

#[async_trait]
impl Scraper for PriceScraper {
    fn source(&self) -> SourceKind {
        self.kind
    }

    async fn run_once(&self, cancel: &Cancellation) -> usize {
        let payload = match self.fetch(cancel).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(source = %self.kind, error = %e, kind = e.kind(), "Scrape failed");
                self.health.record_failure(e.to_string());
                return 0;
            }
        };

        if payload.trim().is_empty() {
            let message = format!("Empty response from {} service", self.kind.name());
            warn!(source = %self.kind, "{}", message);
            self.health.record_failure(message);
            return 0;
        }

        let records = self.kind.parse(&payload, Utc::now());
        if records.is_empty() {
            let message = format!("No {} price records parsed from response", self.kind.name());
            warn!(source = %self.kind, bytes = payload.len(), "{}", message);
            self.health.record_failure(message);
            return 0;
        }

        debug!(source = %self.kind, parsed = records.len(), "Parsed price records");

        let outcome = self.ingest(records, cancel).await;
        self.health
            .record_success(outcome.inserted, outcome.anomalies.len(), outcome.summary());

        info!(
            source = %self.kind,
            inserted = outcome.inserted,
            anomalies = outcome.anomalies.len(),
            "Inserted price ticks"
        );

        outcome.inserted
    }

    fn health(&self) -> ScraperHealthSnapshot {
        self.health.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictPolicy;
    use crate::models::price::{CanonicalPriceTick, DailySnapshot, DayChange, StoredTick, TickFilter};
    use crate::repositories::RepoError;
    use crate::repositories::memory::MemoryStore;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticFetcher(Result<String, FetchError>);

    #[async_trait]
    impl HttpFetcher for StaticFetcher {
        async fn get(&self, _url: &str, _timeout: Duration) -> Result<String, FetchError> {
            self.0.clone()
        }
    }

    const PHUC_THANH_PAGE: &str = r#"
        <table>
          <tr><td>Nhẫn tròn 9999</td><td>8.520</td><td>8.420</td></tr>
          <tr><td>Trang sức 9999</td><td>8.450</td><td>8.300</td></tr>
          <tr><td>Trang sức 99%</td><td>9.900</td><td>8.100</td></tr>
        </table>"#;

    /// Fails the first insert, then delegates to the store
    struct FailFirstInsert {
        inner: Arc<MemoryStore>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TickRepository for FailFirstInsert {
        async fn insert(&self, tick: &CanonicalPriceTick) -> Result<bool, RepoError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(RepoError::Database("connection reset".to_string()));
            }
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

    fn scraper(body: Result<String, FetchError>) -> (PriceScraper, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new(chrono_tz::Asia::Ho_Chi_Minh, ConflictPolicy::DoNothing));
        let normalizer = Arc::new(PriceNormalizer::new(store.clone(), store.clone()));

        let mut config = SourceConfig::defaults(SourceKind::PhucThanh);
        config.retry_count = 1;
        config.retry_base_delay = Duration::from_millis(1);

        let scraper = PriceScraper::new(
            SourceKind::PhucThanh,
            config,
            Arc::new(StaticFetcher(body)),
            normalizer,
            store.clone(),
        );
        (scraper, store)
    }

    #[tokio::test]
    async fn test_run_inserts_and_counts_anomalies() {
        let (scraper, store) = scraper(Ok(PHUC_THANH_PAGE.to_string()));

        let inserted = scraper.run_once(&Cancellation::none()).await;

        // 99% row spreads 81.0M -> 99.0M, beyond the 0.20 ratio
        assert_eq!(inserted, 2);
        assert_eq!(store.ticks().len(), 2);

        let health = scraper.health();
        assert_eq!(health.last_inserted, 2);
        assert_eq!(health.last_anomaly_count, 1);
        assert!(health.last_anomaly_summary.unwrap().starts_with("spread ratio"));
        assert!(health.last_success.is_some());
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_empty_body_records_failure() {
        let (scraper, store) = scraper(Ok("   ".to_string()));

        assert_eq!(scraper.run_once(&Cancellation::none()).await, 0);
        assert!(store.ticks().is_empty());

        let health = scraper.health();
        assert_eq!(health.last_error.as_deref(), Some("Empty response from PHUC_THANH service"));
        assert_eq!(health.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_unparseable_body_records_failure() {
        let (scraper, _) = scraper(Ok("<html><body>maintenance</body></html>".to_string()));

        assert_eq!(scraper.run_once(&Cancellation::none()).await, 0);
        assert_eq!(
            scraper.health().last_error.as_deref(),
            Some("No PHUC_THANH price records parsed from response")
        );
    }

    #[tokio::test]
    async fn test_fetch_error_never_escapes() {
        let (scraper, _) = scraper(Err(FetchError::Status(503)));

        assert_eq!(scraper.run_once(&Cancellation::none()).await, 0);

        let health = scraper.health();
        assert_eq!(health.last_error.as_deref(), Some("HTTP error: 503"));
        assert_eq!(health.total_runs, 1);
    }

    #[tokio::test]
    async fn test_insert_failure_does_not_abort_batch() {
        let store = Arc::new(MemoryStore::new(chrono_tz::Asia::Ho_Chi_Minh, ConflictPolicy::DoNothing));
        let normalizer = Arc::new(PriceNormalizer::new(store.clone(), store.clone()));
        let ticks = Arc::new(FailFirstInsert {
            inner: store.clone(),
            calls: AtomicUsize::new(0),
        });

        let mut config = SourceConfig::defaults(SourceKind::PhucThanh);
        config.retry_count = 1;
        let scraper = PriceScraper::new(
            SourceKind::PhucThanh,
            config,
            Arc::new(StaticFetcher(Ok(PHUC_THANH_PAGE.to_string()))),
            normalizer,
            ticks,
        );

        let first = SourceKind::PhucThanh.parse(PHUC_THANH_PAGE, Utc::now()).remove(0);

        assert_eq!(scraper.run_once(&Cancellation::none()).await, 1);
        assert_eq!(store.ticks().len(), 1);

        let health = scraper.health();
        assert_eq!(health.last_inserted, 1);
        assert_eq!(health.last_anomaly_count, 2);
        assert_eq!(health.consecutive_failures, 0);
        let summary = health.last_anomaly_summary.unwrap();
        assert!(summary.starts_with(&format!("insert:{}:database", first.context())));
        assert!(summary.contains(" | spread ratio"));
    }

    #[tokio::test]
    async fn test_normalize_failure_does_not_abort_batch() {
        let (scraper, store) = scraper(Ok(PHUC_THANH_PAGE.to_string()));

        let mut records = SourceKind::PhucThanh.parse(PHUC_THANH_PAGE, Utc::now());
        records[0].currency = Some("VN$".to_string());
        let context = records[0].context();

        let outcome = scraper.ingest(records, &Cancellation::none()).await;

        assert_eq!(outcome.inserted, 1);
        assert_eq!(store.ticks().len(), 1);
        assert_eq!(outcome.anomalies.len(), 2);
        assert_eq!(outcome.anomalies[0], format!("normalize:{}:validation", context));
    }

    #[tokio::test]
    async fn test_cancelled_batch_stops_inserting() {
        let (scraper, store) = scraper(Ok(PHUC_THANH_PAGE.to_string()));
        let (trigger, cancel) = crate::shutdown::ShutdownTrigger::new();
        trigger.trigger();

        let records = SourceKind::PhucThanh.parse(PHUC_THANH_PAGE, Utc::now());
        let outcome = scraper.ingest(records, &cancel).await;

        assert_eq!(outcome.inserted, 0);
        assert!(store.ticks().is_empty());
    }

    #[test]
    fn test_summary_dedups_in_order() {
        let outcome = BatchOutcome {
            inserted: 0,
            anomalies: vec!["b".into(), "a".into(), "b".into()],
        };
        assert_eq!(outcome.summary().as_deref(), Some("b | a"));
        assert!(BatchOutcome::default().summary().is_none());
    }
}
