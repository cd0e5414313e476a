//! Phuc Thanh home page price table
//!
//! Only a handful of named rows are tracked. Cells are `[label, sell, buy]`
//! quoted in thousands of VND per chỉ; stored prices are VND per cây (10 chỉ).

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::SourceKind;
use super::parser::{REGION_HANOI, strip_tags};
use crate::models::price::{GoldForm, RawPriceRecord};

const THOUSAND: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);
const CHI_PER_CAY: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

struct TargetRow {
    label: Regex,
    form: GoldForm,
    karat: u8,
}

lazy_static! {
    static ref TARGET_ROWS: Vec<TargetRow> = vec![
        TargetRow { label: Regex::new(r"(?i)Nhẫn\s*tròn\s*9999").unwrap(), form: GoldForm::Ring, karat: 24 },
        TargetRow { label: Regex::new(r"(?i)Trang\s*sức\s*9999").unwrap(), form: GoldForm::Jewelry, karat: 24 },
        TargetRow { label: Regex::new(r"(?i)Trang\s*sức\s*999\b").unwrap(), form: GoldForm::Jewelry, karat: 24 },
        TargetRow { label: Regex::new(r"(?i)Trang\s*sức\s*99%").unwrap(), form: GoldForm::Jewelry, karat: 24 },
    ];
    static ref ROW_REGEX: Regex = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").unwrap();
    static ref CELL_REGEX: Regex = Regex::new(r"(?is)<td[^>]*>(.*?)</td>").unwrap();
    // "7420" or "7.420" / "14.250.000", not part of a longer digit run
    static ref NUMERIC_CELL_REGEX: Regex =
        Regex::new(r"(?:^|\D)(\d{4,6}|\d{1,3}(?:\.\d{3}){1,2})(?:\D|$)").unwrap();
}

pub fn parse(html: &str, collected_at: DateTime<Utc>) -> Vec<RawPriceRecord> {
    if html.trim().is_empty() {
        return Vec::new();
    }

    let normalized = html.replace("&nbsp;", " ");
    let rows: Vec<Vec<String>> = ROW_REGEX
        .captures_iter(&normalized)
        .map(|row| {
            CELL_REGEX
                .captures_iter(&row[1])
                .map(|cell| strip_tags(&cell[1]))
                .collect()
        })
        .collect();

    TARGET_ROWS
        .iter()
        .filter_map(|target| {
            let cells = rows
                .iter()
                .find(|cells| cells.first().is_some_and(|label| target.label.is_match(label)))?;
            if cells.len() < 3 {
                return None;
            }

            let sell = per_cay(&cells[1])?;
            let buy = per_cay(&cells[2])?;

            Some(RawPriceRecord {
                source_name: SourceKind::PhucThanh.name().to_string(),
                brand: SourceKind::PhucThanh.brand().to_string(),
                form: target.form.as_str().to_string(),
                karat: Some(target.karat.to_string()),
                region: Some(REGION_HANOI.to_string()),
                price_buy: Some(buy),
                price_sell: Some(sell),
                currency: Some("VND".to_string()),
                collected_at,
                effective_at: collected_at,
            })
        })
        .collect()
}

/// "7.420" (thousand VND per chỉ) -> 74,200,000 VND per cây
fn per_cay(cell: &str) -> Option<Decimal> {
    let cap = NUMERIC_CELL_REGEX.captures(cell)?;
    let digits = cap[1].replace(['.', ','], "");
    let per_chi = Decimal::from_str(&digits).ok().filter(|v| *v > Decimal::ZERO)?;
    Some(per_chi * THOUSAND * CHI_PER_CAY)
}
