use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market capitalisation is written to the database in 억 (10^8) units.
pub const EOK: f64 = 100_000_000.0;

// Point-in-time quote from the market-data provider. Never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub previous_close: f64,
    pub market_cap_eok: i64,
    pub name: String,
    pub as_of: DateTime<Utc>,
}

impl PriceQuote {
    /// Build a quote from raw provider values, filling the gaps the same way
    /// for every provider: previous close falls back to the price, name falls
    /// back to the symbol and missing market caps become zero.
    pub fn from_raw(
        symbol: &str,
        price: Option<f64>,
        previous_close: Option<f64>,
        market_cap: Option<f64>,
        name: Option<String>,
        as_of: DateTime<Utc>,
    ) -> Self {
        let price = price.unwrap_or(0.0);
        let previous_close = previous_close.unwrap_or(price);
        // Half-way values round to even, so 2.5억 is written as 2.
        let market_cap_eok = match market_cap {
            Some(cap) if cap > 0.0 => (cap / EOK).round_ties_even() as i64,
            _ => 0,
        };
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| symbol.to_string());

        Self {
            symbol: symbol.to_uppercase(),
            price,
            previous_close,
            market_cap_eok,
            name,
            as_of,
        }
    }

    /// A quote is only written back when it carries a positive price.
    pub fn is_usable(&self) -> bool {
        self.price > 0.0
    }

    pub fn change_percent(&self) -> f64 {
        if self.previous_close > 0.0 {
            let pct = (self.price - self.previous_close) / self.previous_close * 100.0;
            (pct * 100.0).round() / 100.0
        } else {
            0.0
        }
    }

    /// Previous close as written to the database; a missing close reads as the current price.
    pub fn previous_close_or_price(&self) -> f64 {
        if self.previous_close > 0.0 {
            self.previous_close
        } else {
            self.price
        }
    }
}
