use rust_decimal::Decimal;

use crate::models::price::RawPriceRecord;

/// Per-source business-rule thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyFilter {
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub max_spread_ratio: Decimal,
}

impl AnomalyFilter {
    pub fn new(min_price: Decimal, max_price: Decimal, max_spread_ratio: Decimal) -> Self {
        Self {
            min_price,
            max_price,
            max_spread_ratio,
        }
    }

    /// Returns the rejection reason, or `None` when the record may be normalized
    pub fn is_anomalous(&self, record: &RawPriceRecord) -> Option<String> {
        let (buy, sell) = match (record.price_buy, record.price_sell) {
            (Some(buy), Some(sell)) => (buy, sell),
            _ => return Some("missing price".to_string()),
        };

        if buy <= Decimal::ZERO || sell <= Decimal::ZERO {
            return Some("non-positive price".to_string());
        }

        if sell < buy {
            return Some("sell price below buy price".to_string());
        }

        if buy < self.min_price || buy > self.max_price {
            return Some(format!("buy price out of bounds ({})", buy));
        }

        let ratio = (sell - buy) / buy;
        if ratio > self.max_spread_ratio {
            return Some(format!(
                "spread ratio {} exceeds limit {}",
                ratio.round_dp(4),
                self.max_spread_ratio
            ));
        }

        None
    }
}
