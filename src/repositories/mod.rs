//! Storage interfaces the pipeline depends on
//!
//! [`postgres::PgStore`] backs them with SeaORM; [`memory::MemoryStore`] keeps
//! the same semantics in process for tests and database-less runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use crate::models::price::{
    CanonicalPriceTick, DailySnapshot, DayChange, GoldForm, Product, Source, StoredTick, TickFilter,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    Database(String),
    NotFound(String),
    Invalid(String),
}

impl RepoError {
    pub fn kind(&self) -> &'static str {
        match self {
            RepoError::Database(_) => "database",
            RepoError::NotFound(_) => "not_found",
            RepoError::Invalid(_) => "invalid",
        }
    }
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoError::Database(msg) => write!(f, "Database error: {}", msg),
            RepoError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RepoError::Invalid(msg) => write!(f, "Invalid stored data: {}", msg),
        }
    }
}

impl std::error::Error for RepoError {}

impl From<sea_orm::DbErr> for RepoError {
    fn from(e: sea_orm::DbErr) -> Self {
        RepoError::Database(e.to_string())
    }
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<Source>, RepoError>;

    /// Create the source if missing; an existing row gets `base_url` refreshed
    async fn ensure(&self, name: &str, base_url: &str) -> Result<Source, RepoError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find(
        &self,
        brand: &str,
        form: GoldForm,
        karat: Option<u8>,
        region: Option<&str>,
    ) -> Result<Option<Product>, RepoError>;

    /// Find, else create. A create that loses a race falls back to a second find.
    async fn find_or_create(
        &self,
        brand: &str,
        form: GoldForm,
        karat: Option<u8>,
        region: Option<&str>,
    ) -> Result<Product, RepoError>;
}

#[async_trait]
pub trait TickRepository: Send + Sync {
    /// Store a tick under the (product, source, effective_at) uniqueness key.
    ///
    /// Returns `true` when a row was written: always for a new key, and for
    /// an existing key only under [`crate::config::ConflictPolicy::Update`].
    async fn insert(&self, tick: &CanonicalPriceTick) -> Result<bool, RepoError>;

    /// Latest tick per (product, source)
    async fn latest(&self, filter: &TickFilter) -> Result<Vec<StoredTick>, RepoError>;

    /// Daily closes dated on or after `since`, oldest first
    async fn history(&self, filter: &TickFilter, since: NaiveDate) -> Result<Vec<DailySnapshot>, RepoError>;

    /// Most recent close per (product, source) compared with the previous stored close
    async fn day_over_day(&self, filter: &TickFilter) -> Result<Vec<DayChange>, RepoError>;
}

#[async_trait]
pub trait DailySnapshotRepository: Send + Sync {
    /// Recompute and upsert the close of every (product, source) with ticks on
    /// `date` (local calendar date). Returns the number of rows written.
    async fn upsert_daily_close(&self, date: NaiveDate) -> Result<usize, RepoError>;
}
