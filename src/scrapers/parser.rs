//! Text normalization shared by the source parsers

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::models::price::GoldForm;

/// Timezone Vietnamese sources quote their timestamps in
pub const SOURCE_TIMEZONE: Tz = chrono_tz::Asia::Ho_Chi_Minh;

pub const REGION_HANOI: &str = "Hanoi";
pub const REGION_HCMC: &str = "HCMC";

const DEFAULT_KARAT: u8 = 24;

const RING_KEYWORDS: &[&str] = &["nhẫn", "nhan", "ring"];
const BAR_KEYWORDS: &[&str] = &["vàng miếng", "miếng", "mieng", "bar"];
const JEWELRY_KEYWORDS: &[&str] = &["trang sức", "trang suc", "nữ trang", "nu trang", "jewelry"];

const HANOI_KEYWORDS: &[&str] = &["hà nội", "ha noi", "hanoi"];
const HCMC_KEYWORDS: &[&str] = &["hồ chí minh", "ho chi minh", "hcmc", "hcm", "sài gòn", "sai gon"];

lazy_static! {
    // "24K", "18 k", but not the "1KG" bar size
    static ref KARAT_SUFFIX_REGEX: Regex = Regex::new(r"(?i)\b(\d{1,2})\s*k\b").unwrap();
    // bare karat grade; weights like "5 chỉ" or "1L" never match
    static ref STANDALONE_KARAT_REGEX: Regex = Regex::new(r"\b(18|20|22|24)\b").unwrap();
    static ref TAG_REGEX: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
}

/// Detect the product form from a free-text label
pub fn detect_form(text: &str) -> Option<GoldForm> {
    let lower = text.to_lowercase();
    if lower.trim().is_empty() {
        return None;
    }

    if RING_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(GoldForm::Ring)
    } else if BAR_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(GoldForm::Bar)
    } else if JEWELRY_KEYWORDS.iter().any(|k| lower.contains(k)) {
        Some(GoldForm::Jewelry)
    } else {
        None
    }
}

/// Form label for a raw record, falling back to the source's default form
pub fn form_label(text: &str, fallback: GoldForm) -> String {
    detect_form(text).unwrap_or(fallback).as_str().to_string()
}

/// Map a karat or purity notation to a karat number in 1..=24.
///
/// "9999" and "999.9" are 24K purity; "24K" has its suffix stripped;
/// a label that is only a number keeps it; otherwise a bare 18, 20, 22 or
/// 24 inside the text is used. Anything else is 24.
pub fn normalize_karat(text: &str) -> u8 {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return DEFAULT_KARAT;
    }

    if ["9999", "999.9", "999,9", "99.99", "99,99"].iter().any(|p| lower.contains(p)) {
        return DEFAULT_KARAT;
    }

    // already a karat number, as emitted by the parsers
    if let Some(k) = in_karat_range(&lower) {
        return k;
    }

    if let Some(cap) = KARAT_SUFFIX_REGEX.captures(&lower) {
        if let Some(k) = in_karat_range(&cap[1]) {
            return k;
        }
    }

    STANDALONE_KARAT_REGEX
        .captures(&lower)
        .and_then(|cap| in_karat_range(&cap[1]))
        .unwrap_or(DEFAULT_KARAT)
}

fn in_karat_range(digits: &str) -> Option<u8> {
    digits.parse::<u8>().ok().filter(|k| (1..=24).contains(k))
}

/// Map Hanoi / Ho Chi Minh City spellings onto the two canonical labels
pub fn normalize_region(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    if HANOI_KEYWORDS.iter().any(|k| lower.contains(k)) {
        REGION_HANOI
    } else if HCMC_KEYWORDS.iter().any(|k| lower.contains(k)) {
        REGION_HCMC
    } else {
        REGION_HANOI
    }
}

/// Parse a price cell such as "7,420,000" or "7.420.000 đ"; digits only, must be positive
pub fn parse_price(text: &str) -> Option<Decimal> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    Decimal::from_str(&digits).ok().filter(|p| *p > Decimal::ZERO)
}

/// Price from a JSON value that may be a number or a formatted string
pub fn json_price(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .filter(|p| *p > Decimal::ZERO)
        }
        serde_json::Value::String(s) => parse_price(s),
        _ => None,
    }
}

/// Remove markup and collapse whitespace
pub fn strip_tags(html: &str) -> String {
    let text = TAG_REGEX.replace_all(html, " ");
    let text = text.replace("&nbsp;", " ");
    WHITESPACE_REGEX.replace_all(text.trim(), " ").to_string()
}

/// Interpret a source-local timestamp in one of `formats` and convert it to UTC
pub fn parse_local_timestamp(text: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    formats.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(trimmed, fmt)
            .ok()
            .and_then(|naive| SOURCE_TIMEZONE.from_local_datetime(&naive).earliest())
            .map(|local| local.with_timezone(&Utc))
    })
}
