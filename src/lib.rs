// src/lib.rs

use axum::{
    Router,
    routing::{get, post},
};
use chrono_tz::Tz;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use repositories::DailySnapshotRepository;
use scrapers::ScraperRegistry;
use shutdown::Cancellation;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ScraperRegistry>,
    pub snapshots: Arc<dyn DailySnapshotRepository>,
    pub timezone: Tz,
    pub cancel: Cancellation,
}

pub mod entities {
    pub mod sources;
    pub mod products;
}

pub mod services {
    pub mod health;
    pub mod normalizer;
    pub mod daily_close;
}

pub mod config;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod repositories;
pub mod scrapers;
pub mod shutdown;

/// Admin trigger surface
pub fn build_router(state: AppState) -> Router {
    use handlers::admin;

    Router::new()
        .route("/admin/scrape/health", get(admin::list_scraper_health))
        .route("/admin/scrape/{source}", post(admin::trigger_scrape))
        .route("/admin/scrape/{source}/health", get(admin::get_scraper_health))
        .route("/admin/snapshot/daily", post(admin::trigger_daily_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
