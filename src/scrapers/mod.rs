pub mod anomaly;
pub mod btmc;
pub mod doji;
pub mod fetch;
pub mod parser;
pub mod phuc_thanh;
pub mod price_scraper;
pub mod sjc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::models::health::ScraperHealthSnapshot;
use crate::models::price::RawPriceRecord;
use crate::shutdown::Cancellation;

/// The upstream feeds, each with its own hand-written adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Doji,
    Btmc,
    Sjc,
    PhucThanh,
}

impl SourceKind {
    /// Order the recurring loop runs them in
    pub const ALL: [SourceKind; 4] = [SourceKind::Doji, SourceKind::Btmc, SourceKind::Sjc, SourceKind::PhucThanh];

    /// Canonical source name as stored
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Doji => "DOJI",
            SourceKind::Btmc => "BTMC",
            SourceKind::Sjc => "SJC",
            SourceKind::PhucThanh => "PHUC_THANH",
        }
    }

    /// Product brand label
    pub fn brand(&self) -> &'static str {
        match self {
            SourceKind::Doji => "DOJI",
            SourceKind::Btmc => "BTMC",
            SourceKind::Sjc => "SJC",
            SourceKind::PhucThanh => "PhucThanh",
        }
    }

    /// Path segment on the admin surface
    pub fn slug(&self) -> &'static str {
        match self {
            SourceKind::Doji => "doji",
            SourceKind::Btmc => "btmc",
            SourceKind::Sjc => "sjc",
            SourceKind::PhucThanh => "phucthanh",
        }
    }

    pub fn env_prefix(&self) -> &'static str {
        self.name()
    }

    pub fn from_slug(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect();

        SourceKind::ALL.into_iter().find(|kind| kind.slug() == key)
    }

    /// Parse a raw payload with this source's adapter. Malformed input yields no records.
    pub fn parse(&self, payload: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
        match self {
            SourceKind::Doji => doji::parse(payload, collected_at),
            SourceKind::Btmc => btmc::parse(payload, collected_at),
            SourceKind::Sjc => sjc::parse(payload, collected_at),
            SourceKind::PhucThanh => phuc_thanh::parse(payload, collected_at),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One ingestion run per call; never fails outward
#[async_trait]
pub trait Scraper: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Fetch, parse, filter, normalize and insert. Returns the number of ticks written.
    async fn run_once(&self, cancel: &Cancellation) -> usize;

    fn health(&self) -> ScraperHealthSnapshot;
}

/// Enabled scrapers in run order
#[derive(Clone, Default)]
pub struct ScraperRegistry {
    scrapers: Vec<Arc<dyn Scraper>>,
}

impl ScraperRegistry {
    pub fn new(mut scrapers: Vec<Arc<dyn Scraper>>) -> Self {
        scrapers.sort_by_key(|s| SourceKind::ALL.iter().position(|k| *k == s.source()));
        scrapers.dedup_by_key(|s| s.source());
        Self { scrapers }
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn Scraper>> {
        self.scrapers.iter().find(|s| s.source() == kind).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Scraper>> {
        self.scrapers.iter()
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}
