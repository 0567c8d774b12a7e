use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use thiserror::Error;

use crate::models::{PriceQuote, TickerRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("network error: {0}")]
    Network(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("update rejected: {0}")]
    Rejected(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Field values written back to a record after a successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordUpdate {
    pub price: f64,
    pub previous_close: f64,
    pub market_cap_eok: i64,
    pub name: String,
    pub updated_at: DateTime<FixedOffset>,
    pub exchange_rate: Option<f64>,
}

impl RecordUpdate {
    pub fn from_quote(
        quote: &PriceQuote,
        updated_at: DateTime<FixedOffset>,
        exchange_rate: Option<f64>,
    ) -> Self {
        Self {
            price: quote.price,
            previous_close: quote.previous_close_or_price(),
            market_cap_eok: quote.market_cap_eok,
            name: quote.name.clone(),
            updated_at,
            exchange_rate: exchange_rate.filter(|rate| *rate > 0.0),
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_records(&self) -> Result<Vec<TickerRecord>, StoreError>;

    async fn update_record(&self, record_id: &str, update: &RecordUpdate) -> Result<(), StoreError>;
}
