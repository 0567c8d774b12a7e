use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::PriceQuote;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("symbol not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError>;

    /// Quotes for several symbols in one request, keyed by upper-case symbol.
    /// Symbols the provider does not know are simply absent from the map.
    async fn fetch_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, ProviderError>;

    /// Exchange rate for a currency pair such as `USDKRW`, if the provider has one.
    async fn fetch_exchange_rate(&self, _pair: &str) -> Result<Option<f64>, ProviderError> {
        Ok(None)
    }
}
