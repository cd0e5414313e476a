mod common;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use gold_tracker::build_router;
use gold_tracker::models::health::ScraperHealthSnapshot;
use gold_tracker::repositories::TickRepository;
use gold_tracker::scrapers::{Scraper, SourceKind};
use gold_tracker::services::normalizer::PriceNormalizer;
use gold_tracker::shutdown::Cancellation;

use crate::common::{StubFetcher, build_app_state, build_scraper, memory_store};

const PHUC_THANH_PAGE: &str = r#"<table>
    <tr><td>Nhẫn tròn 9999</td><td>8.520</td><td>8.420</td></tr>
</table>"#;

fn build_test_router() -> (Router, Arc<gold_tracker::repositories::memory::MemoryStore>) {
    let store = memory_store();
    let fetcher = Arc::new(StubFetcher::ok(PHUC_THANH_PAGE));
    let scraper = build_scraper(SourceKind::PhucThanh, fetcher, store.clone(), store.clone());

    let state = build_app_state(vec![scraper as Arc<dyn Scraper>], store.clone());
    (build_router(state), store)
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_trigger_scrape_once() {
    let (app, store) = build_test_router();

    let (status, json) = send(app.clone(), Method::POST, "/admin/scrape/phucthanh?mode=once").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["inserted"], 1);
    assert_eq!(store.ticks().len(), 1);

    let (status, json) = send(app, Method::GET, "/admin/scrape/phucthanh/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lastInserted"], 1);
    assert_eq!(json["consecutiveFailures"], 0);
    assert!(json["lastSuccess"].is_string());
}

#[tokio::test]
async fn test_trigger_scrape_requires_once_mode() {
    let (app, store) = build_test_router();

    let (status, json) = send(app.clone(), Method::POST, "/admin/scrape/phucthanh?mode=loop").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "mode must be 'once'");

    let (status, _) = send(app, Method::POST, "/admin/scrape/phucthanh").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.ticks().is_empty());
}

#[tokio::test]
async fn test_unknown_or_disabled_source_is_404() {
    let (app, _) = build_test_router();

    let (status, json) = send(app.clone(), Method::POST, "/admin/scrape/pnj?mode=once").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("pnj"));

    // Known source without a registered scraper
    let (status, _) = send(app, Method::GET, "/admin/scrape/doji/health").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

struct PanickingScraper;

#[async_trait]
impl Scraper for PanickingScraper {
    fn source(&self) -> SourceKind {
        SourceKind::Btmc
    }

    async fn run_once(&self, _cancel: &Cancellation) -> usize {
        panic!("parser bug");
    }

    fn health(&self) -> ScraperHealthSnapshot {
        ScraperHealthSnapshot::default()
    }
}

#[tokio::test]
async fn test_scraper_panic_is_server_error() {
    let store = memory_store();
    let app = build_router(build_app_state(vec![Arc::new(PanickingScraper) as Arc<dyn Scraper>], store));

    let (status, json) = send(app.clone(), Method::POST, "/admin/scrape/btmc?mode=once").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "Scrape of btmc failed");

    // The router keeps serving after the panic
    let (status, _) = send(app, Method::GET, "/admin/scrape/btmc/health").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_list_health() {
    let (app, _) = build_test_router();

    let (status, json) = send(app, Method::GET, "/admin/scrape/health").await;

    assert_eq!(status, StatusCode::OK);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["source"], "phucthanh");
    assert_eq!(entries[0]["totalRuns"], 0);
}

#[tokio::test]
async fn test_daily_snapshot_for_date() {
    let (app, store) = build_test_router();

    // 20:00 in Vietnam on the 19th
    let at = Utc.with_ymd_and_hms(2026, 10, 19, 13, 0, 0).unwrap();
    let raw = SourceKind::PhucThanh.parse(PHUC_THANH_PAGE, at).remove(0);
    let normalizer = PriceNormalizer::new(store.clone(), store.clone());
    store.insert(&normalizer.normalize(&raw).await.unwrap()).await.unwrap();

    let (status, json) = send(app, Method::POST, "/admin/snapshot/daily?date=2026-10-19").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["date"], "2026-10-19");
    assert_eq!(json["status"], "completed");
    assert_eq!(json["rows"], 1);
    assert_eq!(store.snapshots().len(), 1);
}

#[tokio::test]
async fn test_daily_snapshot_rejects_bad_date() {
    let (app, _) = build_test_router();

    let (status, json) = send(app.clone(), Method::POST, "/admin/snapshot/daily?date=19/10/2026").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "date must be in YYYY-MM-DD format");

    let (status, json) = send(app, Method::POST, "/admin/snapshot/daily").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rows"], 0);
}
