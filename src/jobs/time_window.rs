//! Local-time arithmetic shared by the scrape and snapshot loops

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::str::FromStr;

/// How long after the configured snapshot time a run still counts as due
pub const SNAPSHOT_GRACE: Duration = Duration::minutes(5);

/// Retry delay when the next daily run cannot be computed
pub const FALLBACK_DELAY: Duration = Duration::hours(1);

/// Inclusive on both ends. `start > end` means the window spans midnight.
pub fn is_in_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        now >= start && now <= end
    } else {
        now >= start || now <= end
    }
}

/// Parse a cron expression. The five-field form (`*/10 * * * *`) gets a
/// leading seconds field of `0`; six and seven fields are taken as-is.
///
/// Day-of-week numbers follow the `cron` crate, where 1 is Sunday.
pub fn parse_cron(expression: &str) -> Result<Schedule, cron::error::Error> {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {}", trimmed))
    } else {
        Schedule::from_str(trimmed)
    }
}

/// Next fire time of `schedule` strictly after `now`, with fields read as
/// wall-clock time in `tz`. `None` once the schedule is exhausted.
pub fn next_wake(schedule: &Schedule, now: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    schedule
        .after(&now.with_timezone(&tz))
        .next()
        .map(|next| next.with_timezone(&Utc))
}

/// True during the grace period that starts at `at`, across midnight if needed
pub fn is_snapshot_due(now: NaiveTime, at: NaiveTime) -> bool {
    let elapsed = (now - at).num_seconds().rem_euclid(86_400);
    elapsed < SNAPSHOT_GRACE.num_seconds()
}

/// Time from `now` until `at` on the following local day, or
/// [`FALLBACK_DELAY`] when that is not positive.
pub fn delay_until_tomorrow(now: DateTime<Utc>, tz: Tz, at: NaiveTime) -> Duration {
    let tomorrow = now.with_timezone(&tz).date_naive() + Duration::days(1);

    resolve_local(tz, tomorrow.and_time(at))
        .map(|next| next - now)
        .filter(|delay| *delay > Duration::zero())
        .unwrap_or(FALLBACK_DELAY)
}

fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TZ: Tz = chrono_tz::Asia::Ho_Chi_Minh;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Instant for a Vietnam wall-clock time on 2026-10-19
    fn local(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        TZ.with_ymd_and_hms(2026, 10, 19, h, m, s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let (start, end) = (t(7, 30), t(21, 0));

        assert!(!is_in_window(t(7, 29), start, end));
        assert!(is_in_window(t(7, 30), start, end));
        assert!(is_in_window(t(21, 0), start, end));
        assert!(!is_in_window(t(21, 1), start, end));
    }

    #[test]
    fn test_overnight_window() {
        let (start, end) = (t(22, 0), t(2, 0));

        assert!(is_in_window(t(23, 15), start, end));
        assert!(is_in_window(t(0, 0), start, end));
        assert!(is_in_window(t(2, 0), start, end));
        assert!(!is_in_window(t(12, 0), start, end));
    }

    #[test]
    fn test_next_wake_on_ten_minute_boundary() {
        let every_ten = parse_cron("*/10 * * * *").unwrap();

        assert_eq!(next_wake(&every_ten, local(9, 3, 12), TZ), Some(local(9, 10, 0)));
        assert_eq!(next_wake(&every_ten, local(9, 10, 0), TZ), Some(local(9, 20, 0)));
        assert_eq!(next_wake(&every_ten, local(9, 55, 0), TZ), Some(local(10, 0, 0)));
    }

    #[test]
    fn test_next_wake_rolls_over_midnight() {
        let every_ten = parse_cron("*/10 * * * *").unwrap();

        let next = next_wake(&every_ten, local(23, 58, 0), TZ);
        let expected = TZ.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap().with_timezone(&Utc);
        assert_eq!(next, Some(expected));
    }

    #[test]
    fn test_hours_are_read_in_local_time() {
        let eight_am = parse_cron("0 8 * * *").unwrap();

        // 07:30 in Vietnam is 00:30 UTC, so 08:00 local fires at 01:00 UTC
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2026, 10, 19, 1, 0, 0).unwrap();
        assert_eq!(next_wake(&eight_am, now, TZ), Some(expected));

        // Same instant in UTC would wait until 08:00 UTC
        assert_eq!(
            next_wake(&eight_am, now, chrono_tz::UTC),
            Some(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_hour_range_skips_to_next_morning() {
        let business_hours = parse_cron("0 7-17 * * *").unwrap();

        assert_eq!(next_wake(&business_hours, local(12, 10, 0), TZ), Some(local(13, 0, 0)));

        let next = next_wake(&business_hours, local(17, 30, 0), TZ);
        let expected = TZ.with_ymd_and_hms(2026, 10, 20, 7, 0, 0).unwrap().with_timezone(&Utc);
        assert_eq!(next, Some(expected));
    }

    #[test]
    fn test_parse_cron_forms() {
        assert!(parse_cron("0 */10 * * * *").is_ok());
        assert!(parse_cron("  */5 * * * * ").is_ok());
        assert!(parse_cron("every ten minutes").is_err());
        assert!(parse_cron("*/10 * *").is_err());
    }

    #[test]
    fn test_snapshot_due_for_five_minutes() {
        let at = t(21, 5);

        assert!(!is_snapshot_due(t(21, 4), at));
        assert!(is_snapshot_due(t(21, 5), at));
        assert!(is_snapshot_due(NaiveTime::from_hms_opt(21, 9, 59).unwrap(), at));
        assert!(!is_snapshot_due(t(21, 10), at));

        assert!(is_snapshot_due(t(0, 2), t(23, 58)));
    }

    #[test]
    fn test_delay_until_same_time_tomorrow() {
        let delay = delay_until_tomorrow(local(21, 6, 0), TZ, t(21, 5));
        assert_eq!(delay, Duration::hours(24) - Duration::minutes(1));
    }
}
