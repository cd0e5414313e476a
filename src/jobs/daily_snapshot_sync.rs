use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::config::ScheduleConfig;
use crate::jobs::time_window::{delay_until_tomorrow, is_snapshot_due};
use crate::repositories::{DailySnapshotRepository, RepoError};
use crate::shutdown::Cancellation;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);
const FAILURE_COOLDOWN: Duration = Duration::from_secs(300);

pub fn start_daily_snapshot_sync_job(
    snapshots: Arc<dyn DailySnapshotRepository>,
    schedule: ScheduleConfig,
    cancel: Cancellation,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            snapshot_at = %schedule.snapshot_at,
            timezone = %schedule.timezone.name(),
            "Starting daily snapshot sync"
        );

        loop {
            let now = Utc::now();
            let local = now.with_timezone(&schedule.timezone);

            let delay = if is_snapshot_due(local.time(), schedule.snapshot_at) {
                match sync_daily_snapshot(snapshots.as_ref(), local.date_naive()).await {
                    Ok(_) => delay_until_tomorrow(now, schedule.timezone, schedule.snapshot_at)
                        .to_std()
                        .unwrap_or(CHECK_INTERVAL),
                    Err(e) => {
                        tracing::error!("Failed to sync daily snapshot: {}", e);
                        FAILURE_COOLDOWN
                    }
                }
            } else {
                CHECK_INTERVAL
            };

            if !cancel.sleep(delay).await {
                break;
            }
        }

        tracing::info!("Daily snapshot sync stopped");
    })
}

/// Upsert the daily close for `date`. Shared by the loop and the admin trigger.
pub async fn sync_daily_snapshot(
    snapshots: &dyn DailySnapshotRepository,
    date: NaiveDate,
) -> Result<usize, RepoError> {
    tracing::info!(%date, "Computing daily close snapshot");

    let written = snapshots.upsert_daily_close(date).await?;

    tracing::info!(%date, rows = written, "Daily close snapshot stored");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownTrigger;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSnapshots {
        dates: Mutex<Vec<NaiveDate>>,
    }

    #[async_trait]
    impl DailySnapshotRepository for RecordingSnapshots {
        async fn upsert_daily_close(&self, date: NaiveDate) -> Result<usize, RepoError> {
            self.dates.lock().push(date);
            Ok(3)
        }
    }

    #[tokio::test]
    async fn test_sync_passes_date_through() {
        let repo = RecordingSnapshots::default();
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        assert_eq!(sync_daily_snapshot(&repo, date).await, Ok(3));
        assert_eq!(*repo.dates.lock(), vec![date]);
    }

    #[tokio::test]
    async fn test_loop_stops_on_shutdown() {
        let (trigger, cancel) = ShutdownTrigger::new();
        let handle = start_daily_snapshot_sync_job(
            Arc::new(RecordingSnapshots::default()),
            ScheduleConfig::default(),
            cancel,
        );

        trigger.trigger();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
