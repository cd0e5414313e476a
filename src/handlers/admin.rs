use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use crate::{
    AppState,
    jobs::daily_snapshot_sync::sync_daily_snapshot,
    models::admin::{
        DailySnapshotQuery, DailySnapshotResponse, ErrorResponse, ScrapeQuery, ScrapeResponse, SourceHealth,
    },
    models::health::ScraperHealthSnapshot,
    scrapers::{Scraper, SourceKind},
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

fn lookup_scraper(state: &AppState, source: &str) -> Result<Arc<dyn Scraper>, ApiError> {
    SourceKind::from_slug(source)
        .and_then(|kind| state.registry.get(kind))
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("Unknown or disabled source '{}'", source)))
}

/// Handler for POST /admin/scrape/{source}?mode=once
/// Runs one scrape to completion and reports how many ticks were written
pub async fn trigger_scrape(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(query): Query<ScrapeQuery>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    if query.mode.as_deref() != Some("once") {
        return Err(error(StatusCode::BAD_REQUEST, "mode must be 'once'"));
    }

    let scraper = lookup_scraper(&state, &source)?;

    let kind = scraper.source();
    tracing::info!(source = %kind, "Manual scrape triggered");

    let cancel = state.cancel.clone();
    let inserted = tokio::spawn(async move { scraper.run_once(&cancel).await })
        .await
        .map_err(|e| {
            tracing::error!(source = %kind, "Manual scrape failed: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, format!("Scrape of {} failed", kind.slug()))
        })?;

    Ok(Json(ScrapeResponse { inserted }))
}

/// Handler for GET /admin/scrape/{source}/health
pub async fn get_scraper_health(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<ScraperHealthSnapshot>, ApiError> {
    let scraper = lookup_scraper(&state, &source)?;
    Ok(Json(scraper.health()))
}

/// Handler for GET /admin/scrape/health
pub async fn list_scraper_health(State(state): State<AppState>) -> Json<Vec<SourceHealth>> {
    let health = state
        .registry
        .iter()
        .map(|scraper| SourceHealth {
            source: scraper.source().slug().to_string(),
            health: scraper.health(),
        })
        .collect();

    Json(health)
}

/// Handler for POST /admin/snapshot/daily?date=YYYY-MM-DD
pub async fn trigger_daily_snapshot(
    State(state): State<AppState>,
    Query(query): Query<DailySnapshotQuery>,
) -> Result<Json<DailySnapshotResponse>, ApiError> {
    let date = match query.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(text) => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|_| error(StatusCode::BAD_REQUEST, "date must be in YYYY-MM-DD format"))?,
        None => Utc::now().with_timezone(&state.timezone).date_naive(),
    };

    let rows = sync_daily_snapshot(state.snapshots.as_ref(), date)
        .await
        .map_err(|e| {
            tracing::error!(%date, "Manual daily snapshot failed: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(DailySnapshotResponse {
        date: date.format("%Y-%m-%d").to_string(),
        status: "completed".to_string(),
        rows,
    }))
}
