//! Raw record -> canonical tick
//!
//! Validation happens before any repository call, so a bad record never
//! creates a source or product row.

use chrono::SecondsFormat;
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::models::price::{CanonicalPriceTick, GoldForm, RawPriceRecord};
use crate::repositories::{ProductRepository, RepoError, SourceRepository};
use crate::scrapers::parser::{detect_form, normalize_karat};

const DEFAULT_CURRENCY: &str = "VND";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    Validation(String),
    Repository(RepoError),
}

impl NormalizeError {
    pub fn kind(&self) -> &'static str {
        match self {
            NormalizeError::Validation(_) => "validation",
            NormalizeError::Repository(e) => e.kind(),
        }
    }
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizeError::Validation(msg) => write!(f, "Invalid price record: {}", msg),
            NormalizeError::Repository(e) => write!(f, "Repository error during normalization: {}", e),
        }
    }
}

impl std::error::Error for NormalizeError {}

impl From<RepoError> for NormalizeError {
    fn from(e: RepoError) -> Self {
        NormalizeError::Repository(e)
    }
}

/// Field set and order the content hash is computed over
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HashPayload<'a> {
    brand: &'a str,
    form: &'a str,
    karat: Option<u8>,
    region: Option<&'a str>,
    price_buy: String,
    price_sell: String,
    currency: &'a str,
    effective_at: String,
}

struct ValidatedRecord {
    source_name: String,
    brand: String,
    form: GoldForm,
    karat: Option<u8>,
    region: Option<String>,
    price_buy: Decimal,
    price_sell: Decimal,
    currency: String,
}

pub struct PriceNormalizer {
    sources: Arc<dyn SourceRepository>,
    products: Arc<dyn ProductRepository>,
}

impl PriceNormalizer {
    pub fn new(sources: Arc<dyn SourceRepository>, products: Arc<dyn ProductRepository>) -> Self {
        Self { sources, products }
    }

    /// Validate `raw`, resolve its source and product, and build the tick
    pub async fn normalize(&self, raw: &RawPriceRecord) -> Result<CanonicalPriceTick, NormalizeError> {
        let record = validate(raw)?;

        let source = match self.sources.get_by_name(&record.source_name).await? {
            Some(source) => source,
            None => {
                let base_url = format!("https://{}.vn", record.source_name.to_lowercase());
                debug!(source = %record.source_name, %base_url, "Registering new source");
                self.sources.ensure(&record.source_name, &base_url).await?
            }
        };

        let product = self
            .products
            .find_or_create(&record.brand, record.form, record.karat, record.region.as_deref())
            .await?;

        let raw_hash = content_hash(&record, raw);

        CanonicalPriceTick::new(
            product.id,
            source.id,
            record.price_buy,
            record.price_sell,
            record.currency,
            raw.collected_at,
            raw.effective_at,
            raw_hash,
        )
        .map_err(NormalizeError::Validation)
    }
}

fn validate(raw: &RawPriceRecord) -> Result<ValidatedRecord, NormalizeError> {
    let invalid = |msg: &str| NormalizeError::Validation(msg.to_string());

    let source_name = raw.source_name.trim();
    if source_name.is_empty() {
        return Err(invalid("source name is required"));
    }

    let brand = raw.brand.trim();
    if brand.is_empty() {
        return Err(invalid("brand is required"));
    }

    let price_buy = raw.price_buy.ok_or_else(|| invalid("buy price is required"))?;
    let price_sell = raw.price_sell.ok_or_else(|| invalid("sell price is required"))?;
    if price_buy <= Decimal::ZERO {
        return Err(invalid("buy price must be > 0"));
    }
    if price_sell <= Decimal::ZERO {
        return Err(invalid("sell price must be > 0"));
    }
    if price_sell < price_buy {
        return Err(invalid("sell price must be >= buy price"));
    }

    let currency = raw
        .currency
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_CURRENCY)
        .to_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(NormalizeError::Validation(format!(
            "currency must be a 3-letter code, got '{}'",
            currency
        )));
    }

    let form = GoldForm::from_str(&raw.form)
        .or_else(|| detect_form(&raw.form))
        .unwrap_or(GoldForm::Other);

    let karat = raw
        .karat
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(normalize_karat);

    let region = raw
        .region
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    Ok(ValidatedRecord {
        source_name: source_name.to_string(),
        brand: brand.to_string(),
        form,
        karat,
        region,
        price_buy,
        price_sell,
        currency,
    })
}

/// Lowercase hex SHA-256 over the normalized quote.
///
/// Prices are written in their normalized decimal form so `7420000` and
/// `7420000.00` hash the same.
fn content_hash(record: &ValidatedRecord, raw: &RawPriceRecord) -> String {
    let payload = HashPayload {
        brand: &record.brand,
        form: record.form.as_str(),
        karat: record.karat,
        region: record.region.as_deref(),
        price_buy: record.price_buy.normalize().to_string(),
        price_sell: record.price_sell.normalize().to_string(),
        currency: &record.currency,
        effective_at: raw.effective_at.to_rfc3339_opts(SecondsFormat::Micros, true),
    };

    // Serializing a struct of strings and integers cannot fail
    let json = serde_json::to_string(&payload).unwrap_or_default();
    hex::encode(Sha256::digest(json.as_bytes()))
}
