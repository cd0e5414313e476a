//! Daily close selection
//!
//! A close is the tick whose effective time falls on the local date and is
//! latest by (effective_at, collected_at, id).

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::price::{DailySnapshot, DayChange, Direction, StoredTick};

pub fn select_daily_closes(ticks: &[StoredTick], date: NaiveDate, tz: Tz) -> Vec<DailySnapshot> {
    let mut latest: HashMap<(Uuid, Uuid), &StoredTick> = HashMap::new();

    for tick in ticks
        .iter()
        .filter(|t| t.effective_at.with_timezone(&tz).date_naive() == date)
    {
        latest
            .entry((tick.product_id, tick.source_id))
            .and_modify(|current| {
                if ordering_key(tick) > ordering_key(*current) {
                    *current = tick;
                }
            })
            .or_insert(tick);
    }

    let mut closes: Vec<DailySnapshot> = latest
        .into_values()
        .map(|tick| DailySnapshot {
            product_id: tick.product_id,
            source_id: tick.source_id,
            date,
            price_buy_close: tick.price_buy,
            price_sell_close: tick.price_sell,
        })
        .collect();
    closes.sort_by_key(|s| (s.product_id, s.source_id));
    closes
}

fn ordering_key(tick: &StoredTick) -> (chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>, i64) {
    (tick.effective_at, tick.collected_at, tick.id)
}

/// Latest close per (product, source) against the close stored before it
pub fn day_over_day(snapshots: &[DailySnapshot]) -> Vec<DayChange> {
    let mut series: HashMap<(Uuid, Uuid), Vec<&DailySnapshot>> = HashMap::new();
    for snapshot in snapshots {
        series
            .entry((snapshot.product_id, snapshot.source_id))
            .or_default()
            .push(snapshot);
    }

    let mut changes: Vec<DayChange> = series
        .into_values()
        .filter_map(|mut closes| {
            closes.sort_by_key(|s| s.date);
            let last = closes.pop()?;
            let delta = closes
                .last()
                .map(|prev| last.price_sell_close - prev.price_sell_close)
                .unwrap_or_default();

            Some(DayChange {
                product_id: last.product_id,
                source_id: last.source_id,
                date: last.date,
                price_sell_close: last.price_sell_close,
                delta_vs_yesterday: delta,
                direction: Direction::from_delta(delta),
            })
        })
        .collect();
    changes.sort_by_key(|c| (c.product_id, c.source_id));
    changes
}
