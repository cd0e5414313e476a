use chrono::{NaiveTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::config::ScheduleConfig;
use crate::jobs::time_window::{is_in_window, next_wake, parse_cron};
use crate::scrapers::ScraperRegistry;
use crate::shutdown::Cancellation;

const FAILURE_COOLDOWN: Duration = Duration::from_secs(60);

pub fn start_scrape_schedule_job(
    registry: Arc<ScraperRegistry>,
    schedule: ScheduleConfig,
    cancel: Cancellation,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cron = match parse_cron(&schedule.scrape_cron) {
            Ok(cron) => cron,
            Err(e) => {
                tracing::error!(cron = %schedule.scrape_cron, "Invalid scrape cron expression: {}", e);
                return;
            }
        };

        tracing::info!(
            window_start = %schedule.window_start,
            window_end = %schedule.window_end,
            timezone = %schedule.timezone.name(),
            cron = %schedule.scrape_cron,
            scrapers = registry.len(),
            "Starting scrape schedule"
        );

        loop {
            let now = Utc::now();
            let Some(wake) = next_wake(&cron, now, schedule.timezone) else {
                tracing::warn!(cron = %schedule.scrape_cron, "Scrape cron expression has no further runs");
                break;
            };
            let delay = (wake - now).to_std().unwrap_or(Duration::ZERO);

            tracing::debug!(next_run = %wake, "Scrape loop sleeping");
            if !cancel.sleep(delay).await {
                break;
            }

            let local_time = Utc::now().with_timezone(&schedule.timezone).time();

            // A panicking scraper must not take the loop down with it
            let cycle = tokio::spawn({
                let registry = registry.clone();
                let schedule = schedule.clone();
                let cancel = cancel.clone();
                async move { run_scrape_cycle(&registry, &schedule, local_time, &cancel).await }
            });

            if let Err(e) = cycle.await {
                tracing::error!("Scrape cycle failed: {}", e);
                if !cancel.sleep(FAILURE_COOLDOWN).await {
                    break;
                }
            }
        }

        tracing::info!("Scrape schedule stopped");
    })
}

/// Run every registered scraper once, in order, if `local_time` is inside the
/// configured window. Returns `None` when the cycle was skipped.
pub async fn run_scrape_cycle(
    registry: &ScraperRegistry,
    schedule: &ScheduleConfig,
    local_time: NaiveTime,
    cancel: &Cancellation,
) -> Option<usize> {
    if !is_in_window(local_time, schedule.window_start, schedule.window_end) {
        tracing::debug!(%local_time, "Outside scrape window, skipping cycle");
        return None;
    }

    let mut inserted = 0;
    for scraper in registry.iter() {
        if cancel.is_cancelled() {
            break;
        }

        let count = scraper.run_once(cancel).await;
        tracing::debug!(source = %scraper.source(), inserted = count, "Scraper finished");
        inserted += count;
    }

    tracing::info!(inserted, "Scrape cycle complete");
    Some(inserted)
}
