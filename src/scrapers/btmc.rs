//! BTMC price feed
//!
//! The endpoint publishes `Data` items whose fields carry a numeric index
//! suffix: `n_1`, `pb_1`, `ps_1`, `k_1`, `d_1`, ... The JSON rendition nests
//! them under `DataList.Data[]` with an `@` prefix, the XML rendition uses
//! plain attributes on `<Data>` elements.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use super::SourceKind;
use super::parser::{REGION_HANOI, detect_form, normalize_karat, parse_local_timestamp, parse_price};
use crate::models::price::{GoldForm, RawPriceRecord};

const TIMESTAMP_FORMATS: &[&str] = &["%d/%m/%Y %H:%M", "%d/%m/%Y %H:%M:%S"];
const MAX_PROBE_INDEX: usize = 128;

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
        debug!("BTMC JSON payload yielded no records, trying XML");
    }

    parse_xml(trimmed, collected_at)
}

fn parse_json(payload: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let Ok(root) = serde_json::from_str::<Value>(payload) else {
        return Vec::new();
    };

    let Some(items) = root
        .get("DataList")
        .and_then(|list| list.get("Data"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|item| {
            let field = |key: &str| match item.get(&format!("@{}", key))? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            parse_indexed_fields(&field, collected_at)
        })
        .collect()
}

fn parse_xml(payload: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Data" => {
                let attributes: HashMap<String, String> = e
                    .attributes()
                    .filter_map(Result::ok)
                    .filter_map(|attr| {
                        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                        let value = attr.unescape_value().ok()?.into_owned();
                        Some((key, value))
                    })
                    .collect();

                let field = |key: &str| attributes.get(key).cloned();
                records.extend(parse_indexed_fields(&field, collected_at));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(error = %e, "BTMC XML payload is malformed");
                break;
            }
            _ => {}
        }
    }

    records
}

/// Walk `n_i`, `n_{i+1}`, ... from the item's starting index until a name is missing
fn parse_indexed_fields(field: &dyn Fn(&str) -> Option<String>, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    let start = field("row")
        .and_then(|row| row.trim().parse::<usize>().ok())
        .filter(|row| field(&format!("n_{}", row)).is_some())
        .or_else(|| (1..MAX_PROBE_INDEX).find(|i| field(&format!("n_{}", i)).is_some()));

    let Some(mut index) = start else {
        return Vec::new();
    };

    let mut records = Vec::new();
    while let Some(name) = field(&format!("n_{}", index)) {
        let price_buy = field(&format!("pb_{}", index)).and_then(|v| parse_price(&v));
        let price_sell = field(&format!("ps_{}", index)).and_then(|v| parse_price(&v));

        if let (Some(buy), Some(sell)) = (price_buy, price_sell) {
            let karat = field(&format!("k_{}", index)).or_else(|| field(&format!("h_{}", index)));
            let effective_at = field(&format!("d_{}", index))
                .and_then(|d| parse_local_timestamp(&d, TIMESTAMP_FORMATS))
                .unwrap_or(collected_at);

            records.push(RawPriceRecord {
                source_name: SourceKind::Btmc.name().to_string(),
                brand: SourceKind::Btmc.brand().to_string(),
                form: form_for(&name).as_str().to_string(),
                karat: Some(normalize_karat(karat.as_deref().unwrap_or_default()).to_string()),
                region: Some(REGION_HANOI.to_string()),
                price_buy: Some(buy),
                price_sell: Some(sell),
                currency: Some("VND".to_string()),
                collected_at,
                effective_at,
            });
        }

        index += 1;
    }

    records
}

fn form_for(name: &str) -> GoldForm {
    if let Some(form) = detect_form(name) {
        return form;
    }

    let lower = name.to_lowercase();
    if lower.contains("quà mừng") || lower.contains("qua mung") {
        GoldForm::Other
    } else {
        GoldForm::Bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 3, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_json_data_list() {
        let payload = r#"{
            "DataList": {
                "Data": [
                    {"@row": "1", "@n_1": "VÀNG MIẾNG VRTL", "@k_1": "24k", "@h_1": "999.9",
                     "@pb_1": "8520000", "@ps_1": "8620000", "@d_1": "19/10/2026 08:15"},
                    {"@row": "2", "@n_2": "NHẪN TRÒN TRƠN", "@h_2": "9999",
                     "@pb_2": 8400000, "@ps_2": 8500000, "@d_2": "19/10/2026 08:15"},
                    {"@row": "3", "@n_3": "QUÀ MỪNG BẢN VỊ VÀNG", "@k_3": "24k",
                     "@pb_3": "0", "@ps_3": "8500000"}
                ]
            }
        }"#;

        let records = parse(payload, now());
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].form, "bar");
        assert_eq!(records[0].karat.as_deref(), Some("24"));
        assert_eq!(records[0].region.as_deref(), Some("Hanoi"));
        assert_eq!(records[0].price_buy, Some(dec!(8520000)));
        assert_eq!(records[0].effective_at, Utc.with_ymd_and_hms(2026, 10, 19, 1, 15, 0).unwrap());
        assert_eq!(records[0].collected_at, now());

        assert_eq!(records[1].form, "ring");
        assert_eq!(records[1].price_sell, Some(dec!(8500000)));
    }

    #[test]
    fn test_json_row_falls_back_to_probing() {
        let payload = r#"{"DataList":{"Data":[
            {"@n_7": "Quà mừng", "@pb_7": "8000000", "@ps_7": "8100000"}
        ]}}"#;

        let records = parse(payload, now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].form, "other");
        assert_eq!(records[0].effective_at, now());
    }

    #[test]
    fn test_parse_xml_attributes() {
        let payload = r#"<?xml version="1.0" encoding="utf-8"?>
            <DataList>
                <Data row="1" n_1="VÀNG MIẾNG SJC" k_1="24k" pb_1="8,600,000" ps_1="8,800,000" d_1="19/10/2026 09:00" />
                <Data row="2" n_2="Trang sức 99.9" h_2="99.9" pb_2="8100000" ps_2="8300000" />
            </DataList>"#;

        let records = parse(payload, now());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].form, "bar");
        assert_eq!(records[0].price_buy, Some(dec!(8600000)));
        assert_eq!(records[1].form, "jewelry");
        assert_eq!(records[1].karat.as_deref(), Some("24"));
    }

    #[test]
    fn test_xml_element_with_several_indices() {
        let payload = r#"<Root><Data n_1="Nhẫn" pb_1="8000000" ps_1="8100000" n_2="Miếng" pb_2="8500000" ps_2="8700000"/></Root>"#;

        let records = parse(payload, now());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].form, "bar");
    }

    #[test]
    fn test_malformed_payloads_yield_nothing() {
        assert!(parse("", now()).is_empty());
        assert!(parse("{not json", now()).is_empty());
        assert!(parse("<Data n_1=\"x\"", now()).is_empty());
        assert!(parse(r#"{"DataList":{}}"#, now()).is_empty());
    }
}
