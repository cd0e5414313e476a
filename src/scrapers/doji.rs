//! DOJI price page
//!
//! The page layout changes without notice, so extraction walks a ladder and
//! stops at the first tier that yields anything:
//! 1. `table tr` rows with at least four cells
//! 2. `.price-row` / `div[class*=price]` groups with at least four spans
//! 3. keyword regexes over the tag-stripped text
//!
//! Payloads that look like JSON go through [`parse_json`] first.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::debug;

use super::SourceKind;
use super::parser::{detect_form, json_price, normalize_karat, normalize_region, parse_price, strip_tags};
use crate::models::price::RawPriceRecord;

lazy_static! {
    static ref TABLE_ROW: Selector = Selector::parse("table tr").unwrap();
    static ref TABLE_CELL: Selector = Selector::parse("td").unwrap();
    static ref PRICE_GROUP: Selector = Selector::parse(".price-row, div[class*='price']").unwrap();
    static ref SPAN: Selector = Selector::parse("span").unwrap();

    static ref TEXT_PATTERNS: Vec<Regex> = vec![
        // "Nhẫn tròn trơn 24K ... Hà Nội ... 7,420,000 ... 7,520,000"
        Regex::new(r"(?i)(nhẫn[^<]{0,80}?)(hà\s*nội|hanoi|hồ\s*chí\s*minh|ho\s*chi\s*minh|hcmc|hcm)\D{0,40}([\d.,]{5,})\D{0,20}([\d.,]{5,})").unwrap(),
        // "Vàng miếng 9999 ... HCMC ... 7.5xx.000 ... 7.6xx.000"
        Regex::new(r"(?i)(vàng\s*miếng[^<]{0,80}?)(hà\s*nội|hanoi|hồ\s*chí\s*minh|ho\s*chi\s*minh|hcmc|hcm)\D{0,40}([\d.,]{5,})\D{0,20}([\d.,]{5,})").unwrap(),
    ];
}

pub fn parse(payload: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let trimmed = payload.trim_start();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let records = parse_json(trimmed, collected_at);
        if !records.is_empty() {
            return records;
        }
    }

    let records = parse_html(payload, collected_at);
    if !records.is_empty() {
        return records;
    }

    parse_json(trimmed, collected_at)
}

pub fn parse_html(html: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let document = Html::parse_document(html);

    let records = cell_rows(&document, &TABLE_ROW, &TABLE_CELL, collected_at);
    if !records.is_empty() {
        debug!(count = records.len(), "DOJI table rows parsed");
        return records;
    }

    let records = cell_rows(&document, &PRICE_GROUP, &SPAN, collected_at);
    if !records.is_empty() {
        debug!(count = records.len(), "DOJI price groups parsed");
        return records;
    }

    let records = text_patterns(html, collected_at);
    if !records.is_empty() {
        debug!(count = records.len(), "DOJI text patterns matched");
    }
    records
}

fn cell_rows(
    document: &Html,
    row_selector: &Selector,
    cell_selector: &Selector,
    collected_at: DateTime<Utc>,
) -> Vec<RawPriceRecord> {
    document
        .select(row_selector)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(cell_selector).map(element_text).collect();
            if cells.len() < 4 {
                return None;
            }
            record_from_parts(&cells[0], &cells[1], parse_price(&cells[2]), parse_price(&cells[3]), collected_at)
        })
        .collect()
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn text_patterns(html: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let text = strip_tags(html);

    TEXT_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(&text))
        .filter_map(|cap| {
            record_from_parts(&cap[1], &cap[2], parse_price(&cap[3]), parse_price(&cap[4]), collected_at)
        })
        .collect()
}

/// Build a record from a form/karat label, a region label and two prices.
/// Rows whose label names no known form, or that lack either price, are dropped.
fn record_from_parts(
    label: &str,
    region: &str,
    price_buy: Option<Decimal>,
    price_sell: Option<Decimal>,
    collected_at: DateTime<Utc>,
) -> Option<RawPriceRecord> {
    let form = detect_form(label)?;
    let (buy, sell) = (price_buy?, price_sell?);

    Some(RawPriceRecord {
        source_name: SourceKind::Doji.name().to_string(),
        brand: SourceKind::Doji.brand().to_string(),
        form: form.as_str().to_string(),
        karat: Some(normalize_karat(label).to_string()),
        region: Some(normalize_region(region).to_string()),
        price_buy: Some(buy),
        price_sell: Some(sell),
        currency: Some("VND".to_string()),
        collected_at,
        effective_at: collected_at,
    })
}

/// JSON rendition: a flat array, or an object wrapping it in `data` or `items`
pub fn parse_json(payload: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let Ok(root) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    let items = match &root {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("data").or_else(|| map.get("items")) {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| json_record(item, collected_at))
        .collect()
}

fn json_record(item: &Value, collected_at: DateTime<Utc>) -> Option<RawPriceRecord> {
    let first = |keys: &[&str]| keys.iter().find_map(|key| item.get(*key).filter(|v| !v.is_null()));

    let form_text = first(&["form", "type"])?.as_str()?;
    let form = detect_form(form_text)?;

    let karat = match first(&["karat", "purity"]) {
        Some(Value::Number(n)) => normalize_karat(&n.to_string()),
        Some(Value::String(s)) => normalize_karat(s),
        _ => normalize_karat("24"),
    };

    let region = first(&["region", "location"])
        .and_then(Value::as_str)
        .map(normalize_region)
        .unwrap_or(super::parser::REGION_HANOI);

    let buy = first(&["priceBuy", "buy"]).and_then(json_price)?;
    let sell = first(&["priceSell", "sell"]).and_then(json_price)?;

    Some(RawPriceRecord {
        source_name: SourceKind::Doji.name().to_string(),
        brand: SourceKind::Doji.brand().to_string(),
        form: form.as_str().to_string(),
        karat: Some(karat.to_string()),
        region: Some(region.to_string()),
        price_buy: Some(buy),
        price_sell: Some(sell),
        currency: Some("VND".to_string()),
        collected_at,
        effective_at: collected_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_table_row() {
        let html = r#"<html><body><table>
            <tr><th>Loại</th><th>Khu vực</th><th>Mua</th><th>Bán</th></tr>
            <tr><td>Nhẫn tròn trơn 24K</td><td>Hanoi</td><td>7,420,000</td><td>7,520,000</td></tr>
        </table></body></html>"#;

        let now = Utc::now();
        let records = parse(html, now);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.source_name, "DOJI");
        assert_eq!(record.brand, "DOJI");
        assert_eq!(record.form, "ring");
        assert_eq!(record.karat.as_deref(), Some("24"));
        assert_eq!(record.region.as_deref(), Some("Hanoi"));
        assert_eq!(record.price_buy, Some(dec!(7420000)));
        assert_eq!(record.price_sell, Some(dec!(7520000)));
        assert_eq!(record.effective_at, now);
    }

    #[test]
    fn test_table_skips_rows_without_form_or_prices() {
        let html = r#"<table>
            <tr><td>Bạc 999</td><td>Hà Nội</td><td>900,000</td><td>950,000</td></tr>
            <tr><td>Vàng miếng SJC</td><td>TP.HCM</td><td>liên hệ</td><td>8,600,000</td></tr>
            <tr><td>Vàng miếng SJC</td><td>Hồ Chí Minh</td><td>8,500,000</td><td>8,600,000</td></tr>
        </table>"#;

        let records = parse_html(html, Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].form, "bar");
        assert_eq!(records[0].region.as_deref(), Some("HCMC"));
    }

    #[test]
    fn test_price_div_fallback() {
        let html = r#"<div class="price-row">
            <span>Nhẫn 9999</span><span>Hà Nội</span><span>7.400.000</span><span>7.500.000</span>
        </div>"#;

        let records = parse_html(html, Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].form, "ring");
        assert_eq!(records[0].price_buy, Some(dec!(7400000)));
    }

    #[test]
    fn test_text_pattern_fallback() {
        let html = "<p>Giá <b>Nhẫn tròn trơn 24K</b> tại Hà Nội: mua 7,420,000 - bán 7,520,000</p>";

        let records = parse_html(html, Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].form, "ring");
        assert_eq!(records[0].region.as_deref(), Some("Hanoi"));
        assert_eq!(records[0].price_sell, Some(dec!(7520000)));
    }

    #[test]
    fn test_json_envelopes() {
        let now = Utc::now();
        let flat = r#"[{"type":"Nhẫn tròn","purity":"9999","location":"HCMC","buy":7400000,"sell":7500000}]"#;
        let wrapped = r#"{"data":[{"form":"ring","karat":18,"priceBuy":"5,000,000","priceSell":"5,200,000"}]}"#;
        let items = r#"{"items":[{"form":"bar","priceBuy":0,"priceSell":8000000},{"form":"bar","priceBuy":7900000}]}"#;

        let records = parse(flat, now);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].region.as_deref(), Some("HCMC"));

        let records = parse(wrapped, now);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].karat.as_deref(), Some("18"));
        assert_eq!(records[0].region.as_deref(), Some("Hanoi"));

        assert!(parse(items, now).is_empty());
    }

    #[test]
    fn test_garbage_yields_nothing() {
        assert!(parse("", Utc::now()).is_empty());
        assert!(parse("<html><body>Bảo trì</body></html>", Utc::now()).is_empty());
        assert!(parse(r#"{"message":"ok"}"#, Utc::now()).is_empty());
    }
}
