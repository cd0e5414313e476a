//! Gold price domain models
//!
//! Raw parser output, the canonical tick that gets persisted, and the
//! product/source identities the normalizer resolves.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Physical form of a gold product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoldForm {
    Ring,
    Bar,
    Jewelry,
    Other,
}

impl GoldForm {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoldForm::Ring => "ring",
            GoldForm::Bar => "bar",
            GoldForm::Jewelry => "jewelry",
            GoldForm::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ring" => Some(GoldForm::Ring),
            "bar" => Some(GoldForm::Bar),
            "jewelry" => Some(GoldForm::Jewelry),
            "other" => Some(GoldForm::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for GoldForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream quote row as a parser saw it. Nothing here is validated yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawPriceRecord {
    pub source_name: String,
    pub brand: String,
    pub form: String,
    pub karat: Option<String>,
    pub region: Option<String>,
    pub price_buy: Option<Decimal>,
    pub price_sell: Option<Decimal>,
    pub currency: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub effective_at: DateTime<Utc>,
}

impl RawPriceRecord {
    /// `brand/form/karat/region`, used to key per-record failures in anomaly summaries
    pub fn context(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.brand,
            self.form,
            self.karat.as_deref().unwrap_or("-"),
            self.region.as_deref().unwrap_or("-")
        )
    }
}

/// Canonical (buy, sell) quote ready for storage.
///
/// Only constructible through [`CanonicalPriceTick::new`], which enforces
/// `sell >= buy > 0` and a 3-letter uppercase currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalPriceTick {
    product_id: Uuid,
    source_id: Uuid,
    price_buy: Decimal,
    price_sell: Decimal,
    currency: String,
    collected_at: DateTime<Utc>,
    effective_at: DateTime<Utc>,
    raw_hash: String,
}

impl CanonicalPriceTick {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        product_id: Uuid,
        source_id: Uuid,
        price_buy: Decimal,
        price_sell: Decimal,
        currency: String,
        collected_at: DateTime<Utc>,
        effective_at: DateTime<Utc>,
        raw_hash: String,
    ) -> Result<Self, String> {
        if price_buy <= Decimal::ZERO {
            return Err(format!("price_buy must be > 0, got {}", price_buy));
        }
        if price_sell < price_buy {
            return Err(format!(
                "price_sell ({}) must be >= price_buy ({})",
                price_sell, price_buy
            ));
        }
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(format!("currency must be a 3-letter ISO code, got '{}'", currency));
        }

        Ok(Self {
            product_id,
            source_id,
            price_buy,
            price_sell,
            currency,
            collected_at,
            effective_at,
            raw_hash,
        })
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn source_id(&self) -> Uuid {
        self.source_id
    }

    pub fn price_buy(&self) -> Decimal {
        self.price_buy
    }

    pub fn price_sell(&self) -> Decimal {
        self.price_sell
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }

    pub fn effective_at(&self) -> DateTime<Utc> {
        self.effective_at
    }

    /// Lowercase hex SHA-256 of the normalized quote
    pub fn raw_hash(&self) -> &str {
        &self.raw_hash
    }

    /// Storage uniqueness key
    pub fn dedup_key(&self) -> (Uuid, Uuid, DateTime<Utc>) {
        (self.product_id, self.source_id, self.effective_at)
    }
}

/// A tick as read back from storage; `id` reflects insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTick {
    pub id: i64,
    pub product_id: Uuid,
    pub source_id: Uuid,
    pub price_buy: Decimal,
    pub price_sell: Decimal,
    pub currency: String,
    pub collected_at: DateTime<Utc>,
    pub effective_at: DateTime<Utc>,
    pub raw_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: Uuid,
    pub brand: String,
    pub form: GoldForm,
    pub karat: Option<u8>,
    pub region: Option<String>,
}

impl Product {
    pub fn matches(&self, brand: &str, form: GoldForm, karat: Option<u8>, region: Option<&str>) -> bool {
        self.brand == brand && self.form == form && self.karat == karat && self.region.as_deref() == region
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: Uuid,
    pub name: String,
    pub base_url: String,
}

/// Close price for one (product, source, local date)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySnapshot {
    pub product_id: Uuid,
    pub source_id: Uuid,
    pub date: NaiveDate,
    pub price_buy_close: Decimal,
    pub price_sell_close: Decimal,
}

/// Optional filters shared by the read operations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TickFilter {
    pub form: Option<GoldForm>,
    pub brand: Option<String>,
    pub region: Option<String>,
}

impl TickFilter {
    pub fn accepts(&self, product: &Product) -> bool {
        self.form.is_none_or(|f| f == product.form)
            && self.brand.as_deref().is_none_or(|b| b == product.brand)
            && self
                .region
                .as_deref()
                .is_none_or(|r| product.region.as_deref() == Some(r))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn from_delta(delta: Decimal) -> Self {
        if delta > Decimal::ZERO {
            Direction::Up
        } else if delta < Decimal::ZERO {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Flat => "flat",
        }
    }
}

/// Latest close for a product/source compared to the previous stored close
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayChange {
    pub product_id: Uuid,
    pub source_id: Uuid,
    pub date: NaiveDate,
    pub price_sell_close: Decimal,
    pub delta_vs_yesterday: Decimal,
    pub direction: Direction,
}
