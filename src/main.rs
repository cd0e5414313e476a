use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gold_tracker::{
    AppState, build_router,
    config::AppConfig,
    jobs::{daily_snapshot_sync::start_daily_snapshot_sync_job, scrape_schedule::start_scrape_schedule_job},
    repositories::{
        DailySnapshotRepository, ProductRepository, SourceRepository, TickRepository, memory::MemoryStore,
        postgres::PgStore,
    },
    scrapers::{
        Scraper, ScraperRegistry,
        fetch::{HttpFetcher, ReqwestFetcher},
        price_scraper::PriceScraper,
    },
    services::normalizer::PriceNormalizer,
    shutdown::ShutdownTrigger,
};

struct Stores {
    sources: Arc<dyn SourceRepository>,
    products: Arc<dyn ProductRepository>,
    ticks: Arc<dyn TickRepository>,
    snapshots: Arc<dyn DailySnapshotRepository>,
}

impl Stores {
    fn shared<S>(store: Arc<S>) -> Self
    where
        S: SourceRepository + ProductRepository + TickRepository + DailySnapshotRepository + 'static,
    {
        Self {
            sources: store.clone(),
            products: store.clone(),
            ticks: store.clone(),
            snapshots: store,
        }
    }
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gold_tracker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    let stores = match config.database_url.as_deref() {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let db = Database::connect(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running migrations...");
            migration::Migrator::up(&db, None)
                .await
                .expect("Failed to run migrations");

            Stores::shared(Arc::new(PgStore::new(
                db,
                config.schedule.timezone,
                config.conflict_policy,
            )))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, prices are kept in memory and lost on exit");
            Stores::shared(Arc::new(MemoryStore::new(
                config.schedule.timezone,
                config.conflict_policy,
            )))
        }
    };

    let fetcher: Arc<dyn HttpFetcher> = Arc::new(ReqwestFetcher::new().expect("Failed to build HTTP client"));
    let normalizer = Arc::new(PriceNormalizer::new(stores.sources.clone(), stores.products.clone()));

    let scrapers: Vec<Arc<dyn Scraper>> = config
        .sources
        .iter()
        .filter(|(kind, source)| {
            if !source.enabled {
                tracing::info!(source = %kind, "Scraper disabled");
            }
            source.enabled
        })
        .map(|(kind, source)| {
            Arc::new(PriceScraper::new(
                *kind,
                source.clone(),
                fetcher.clone(),
                normalizer.clone(),
                stores.ticks.clone(),
            )) as Arc<dyn Scraper>
        })
        .collect();
    let registry = Arc::new(ScraperRegistry::new(scrapers));

    let (shutdown, cancel) = ShutdownTrigger::new();
    let mut jobs = Vec::new();

    if config.schedule.scraper_enabled {
        jobs.push(start_scrape_schedule_job(
            registry.clone(),
            config.schedule.clone(),
            shutdown.subscribe(),
        ));
    } else {
        tracing::info!("Scrape schedule disabled (SCRAPER_ENABLED=false)");
    }

    if config.schedule.snapshot_enabled {
        jobs.push(start_daily_snapshot_sync_job(
            stores.snapshots.clone(),
            config.schedule.clone(),
            shutdown.subscribe(),
        ));
    } else {
        tracing::info!("Daily snapshot sync disabled (SNAPSHOT_ENABLED=false)");
    }

    let state = AppState {
        registry,
        snapshots: stores.snapshots,
        timezone: config.schedule.timezone,
        cancel,
    };

    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("Failed to bind admin port");

    tracing::info!("Server listening on {}", listener.local_addr().expect("Listener has no address"));

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    });

    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }

    shutdown.trigger();
    for job in jobs {
        if let Err(e) = job.await {
            tracing::error!("Background job ended abnormally: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
}
