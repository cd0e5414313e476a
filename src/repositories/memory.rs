//! In-process store used by tests and when no database is configured

use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{DailySnapshotRepository, ProductRepository, RepoError, SourceRepository, TickRepository};
use crate::config::ConflictPolicy;
use crate::models::price::{
    CanonicalPriceTick, DailySnapshot, DayChange, GoldForm, Product, Source, StoredTick, TickFilter,
};
use crate::services::daily_close;

#[derive(Debug, Default)]
struct MemoryState {
    sources: Vec<Source>,
    products: Vec<Product>,
    ticks: Vec<StoredTick>,
    next_tick_id: i64,
    snapshots: BTreeMap<(Uuid, Uuid, NaiveDate), DailySnapshot>,
}

pub struct MemoryStore {
    timezone: Tz,
    conflict_policy: ConflictPolicy,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new(timezone: Tz, conflict_policy: ConflictPolicy) -> Self {
        Self {
            timezone,
            conflict_policy,
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn ticks(&self) -> Vec<StoredTick> {
        self.state.lock().ticks.clone()
    }

    pub fn snapshots(&self) -> Vec<DailySnapshot> {
        self.state.lock().snapshots.values().cloned().collect()
    }

    pub fn products(&self) -> Vec<Product> {
        self.state.lock().products.clone()
    }

    fn product_index(state: &MemoryState) -> BTreeMap<Uuid, Product> {
        state.products.iter().map(|p| (p.id, p.clone())).collect()
    }
}

#[async_trait]
impl SourceRepository for MemoryStore {
    async fn get_by_name(&self, name: &str) -> Result<Option<Source>, RepoError> {
        Ok(self.state.lock().sources.iter().find(|s| s.name == name).cloned())
    }

    async fn ensure(&self, name: &str, base_url: &str) -> Result<Source, RepoError> {
        let mut state = self.state.lock();
        if let Some(existing) = state.sources.iter_mut().find(|s| s.name == name) {
            existing.base_url = base_url.to_string();
            return Ok(existing.clone());
        }

        let source = Source {
            id: Uuid::new_v4(),
            name: name.to_string(),
            base_url: base_url.to_string(),
        };
        state.sources.push(source.clone());
        Ok(source)
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn find(
        &self,
        brand: &str,
        form: GoldForm,
        karat: Option<u8>,
        region: Option<&str>,
    ) -> Result<Option<Product>, RepoError> {
        Ok(self
            .state
            .lock()
            .products
            .iter()
            .find(|p| p.matches(brand, form, karat, region))
            .cloned())
    }

    async fn find_or_create(
        &self,
        brand: &str,
        form: GoldForm,
        karat: Option<u8>,
        region: Option<&str>,
    ) -> Result<Product, RepoError> {
        // Find and create under one lock, so there is no race to retry
        let mut state = self.state.lock();
        if let Some(existing) = state.products.iter().find(|p| p.matches(brand, form, karat, region)) {
            return Ok(existing.clone());
        }

        let product = Product {
            id: Uuid::new_v4(),
            brand: brand.to_string(),
            form,
            karat,
            region: region.map(str::to_string),
        };
        state.products.push(product.clone());
        Ok(product)
    }
}

#[async_trait]
impl TickRepository for MemoryStore {
    async fn insert(&self, tick: &CanonicalPriceTick) -> Result<bool, RepoError> {
        let mut state = self.state.lock();
        let key = tick.dedup_key();

        if let Some(existing) = state
            .ticks
            .iter_mut()
            .find(|t| (t.product_id, t.source_id, t.effective_at) == key)
        {
            return match self.conflict_policy {
                ConflictPolicy::DoNothing => Ok(false),
                ConflictPolicy::Update => {
                    existing.price_buy = tick.price_buy();
                    existing.price_sell = tick.price_sell();
                    existing.currency = tick.currency().to_string();
                    existing.collected_at = tick.collected_at();
                    existing.raw_hash = tick.raw_hash().to_string();
                    Ok(true)
                }
            };
        }

        state.next_tick_id += 1;
        let id = state.next_tick_id;
        state.ticks.push(StoredTick {
            id,
            product_id: tick.product_id(),
            source_id: tick.source_id(),
            price_buy: tick.price_buy(),
            price_sell: tick.price_sell(),
            currency: tick.currency().to_string(),
            collected_at: tick.collected_at(),
            effective_at: tick.effective_at(),
            raw_hash: tick.raw_hash().to_string(),
        });
        Ok(true)
    }

    async fn latest(&self, filter: &TickFilter) -> Result<Vec<StoredTick>, RepoError> {
        let state = self.state.lock();
        let products = Self::product_index(&state);

        let mut latest: BTreeMap<(Uuid, Uuid), &StoredTick> = BTreeMap::new();
        for tick in &state.ticks {
            if !products.get(&tick.product_id).is_some_and(|p| filter.accepts(p)) {
                continue;
            }
            let slot = latest.entry((tick.product_id, tick.source_id)).or_insert(tick);
            if (tick.effective_at, tick.collected_at, tick.id) > (slot.effective_at, slot.collected_at, slot.id) {
                *slot = tick;
            }
        }

        Ok(latest.into_values().cloned().collect())
    }

    async fn history(&self, filter: &TickFilter, since: NaiveDate) -> Result<Vec<DailySnapshot>, RepoError> {
        let state = self.state.lock();
        let products = Self::product_index(&state);

        let mut rows: Vec<DailySnapshot> = state
            .snapshots
            .values()
            .filter(|s| s.date >= since)
            .filter(|s| products.get(&s.product_id).is_some_and(|p| filter.accepts(p)))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.date, s.product_id, s.source_id));
        Ok(rows)
    }

    async fn day_over_day(&self, filter: &TickFilter) -> Result<Vec<DayChange>, RepoError> {
        let state = self.state.lock();
        let products = Self::product_index(&state);

        let rows: Vec<DailySnapshot> = state
            .snapshots
            .values()
            .filter(|s| products.get(&s.product_id).is_some_and(|p| filter.accepts(p)))
            .cloned()
            .collect();
        Ok(daily_close::day_over_day(&rows))
    }
}

#[async_trait]
impl DailySnapshotRepository for MemoryStore {
    async fn upsert_daily_close(&self, date: NaiveDate) -> Result<usize, RepoError> {
        let mut state = self.state.lock();
        let closes = daily_close::select_daily_closes(&state.ticks, date, self.timezone);
        let written = closes.len();

        for close in closes {
            state
                .snapshots
                .insert((close.product_id, close.source_id, close.date), close);
        }

        tracing::debug!(%date, written, "Daily closes upserted in memory");
        Ok(written)
    }
}
