pub mod daily_snapshot_sync;
pub mod scrape_schedule;
pub mod time_window;
