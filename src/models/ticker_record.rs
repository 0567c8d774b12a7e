use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// One tracked security, backed by a page in the Notion database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub record_id: String,
    pub symbol: String,
    pub last_price: Option<f64>,
    pub last_updated: Option<DateTime<FixedOffset>>,
}

impl TickerRecord {
    pub fn new(record_id: impl Into<String>, symbol: &str) -> Self {
        Self {
            record_id: record_id.into(),
            symbol: normalize_symbol(symbol),
            last_price: None,
            last_updated: None,
        }
    }

    pub fn has_symbol(&self) -> bool {
        !self.symbol.is_empty()
    }
}

/// Tickers are matched case-insensitively against the provider, so they are
/// stored trimmed and upper-cased.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}
