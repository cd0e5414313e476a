use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::SourceKind;
use super::parser::{form_label, json_price, normalize_karat, normalize_region, parse_local_timestamp};
use crate::models::price::{GoldForm, RawPriceRecord};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SjcPriceResponse {
    /// "08:30 19/10/2026", Vietnam local time
    latest_date: Option<String>,
    #[serde(default)]
    data: Vec<SjcPriceRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SjcPriceRow {
    type_name: Option<String>,
    branch_name: Option<String>,
    buy_value: Option<Value>,
    sell_value: Option<Value>,
}

/// Parse the SJC price service response. Every row shares the feed's `latestDate`.
pub fn parse(payload: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let Ok(response) = serde_json::from_str::<SjcPriceResponse>(payload) else {
        return Vec::new();
    };

    let effective_at = response
        .latest_date
        .as_deref()
        .and_then(|text| parse_local_timestamp(text, &["%H:%M %d/%m/%Y"]))
        .unwrap_or(collected_at);

    response
        .data
        .into_iter()
        .filter_map(|row| {
            let buy = row.buy_value.as_ref().and_then(json_price)?;
            let sell = row.sell_value.as_ref().and_then(json_price)?;
            let type_name = row.type_name.unwrap_or_default();
            let branch = row.branch_name.unwrap_or_default();

            Some(RawPriceRecord {
                source_name: SourceKind::Sjc.name().to_string(),
                brand: SourceKind::Sjc.brand().to_string(),
                form: form_label(&type_name, GoldForm::Bar),
                karat: Some(normalize_karat(&type_name).to_string()),
                region: Some(normalize_region(&branch).to_string()),
                price_buy: Some(buy),
                price_sell: Some(sell),
                currency: Some("VND".to_string()),
                collected_at,
                effective_at,
            })
        })
        .collect()
}
