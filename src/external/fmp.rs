use crate::config::FmpConfig;
use crate::external::quote_provider::{ProviderError, QuoteProvider};
use crate::models::PriceQuote;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const QUOTE_TIMEOUT: Duration = Duration::from_secs(20);
const FX_TIMEOUT: Duration = Duration::from_secs(15);

/// Financial Modeling Prep client.
///
/// Uses the v3 quote endpoint, which accepts a comma separated symbol list
/// on paid plans and a single symbol on the free tier.
pub struct FmpProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FmpProvider {
    pub fn new(config: &FmpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Base URL plus percent-encoded path segments, so tickers holding `?`, `#`
    /// or `/` stay inside their segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ProviderError::InvalidRequest(format!("bad FMP url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidRequest(format!("FMP url cannot take a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url, timeout: Duration) -> Result<Value, ProviderError> {
        let resp = self
            .client
            .get(url)
            .query(&[("apikey", self.api_key.as_str())])
            .timeout(timeout)
            .send()
            .await
            .map_err(network_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        check_error_message(&body)?;
        Ok(body)
    }
}

fn network_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Network(format!("timed out: {}", err))
    } else {
        ProviderError::Network(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpQuote {
    symbol: Option<String>,
    name: Option<String>,
    price: Option<f64>,
    previous_close: Option<f64>,
    market_cap: Option<f64>,
    timestamp: Option<i64>,
}

fn status_error(status: StatusCode, body: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Forbidden(format!("{}: {}", status, body)),
        StatusCode::NOT_FOUND => ProviderError::NotFound(body),
        _ => ProviderError::BadResponse(format!("{}: {}", status, body)),
    }
}

// FMP sometimes answers 200 with { "Error Message": "..." } instead of a status code.
fn check_error_message(body: &Value) -> Result<(), ProviderError> {
    let Some(msg) = body.get("Error Message").and_then(Value::as_str) else {
        return Ok(());
    };

    let lower = msg.to_lowercase();
    if lower.contains("limit reach") || lower.contains("rate limit") {
        Err(ProviderError::RateLimited)
    } else if lower.contains("exclusive") || lower.contains("subscription") {
        Err(ProviderError::Forbidden(msg.to_string()))
    } else {
        Err(ProviderError::BadResponse(msg.to_string()))
    }
}

/// Parse a quote array into quotes keyed by upper-case symbol.
pub(crate) fn parse_quotes(body: Value, now: DateTime<Utc>) -> Result<HashMap<String, PriceQuote>, ProviderError> {
    if body.is_null() {
        return Ok(HashMap::new());
    }

    let items: Vec<FmpQuote> = serde_json::from_value(body)
        .map_err(|e| ProviderError::Parse(e.to_string()))?;

    let mut out = HashMap::new();
    for item in items {
        let symbol = item.symbol.unwrap_or_default().trim().to_uppercase();
        if symbol.is_empty() {
            continue;
        }

        let as_of = item
            .timestamp
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .unwrap_or(now);

        let quote = PriceQuote::from_raw(
            &symbol,
            item.price,
            item.previous_close,
            item.market_cap,
            item.name,
            as_of,
        );
        out.insert(symbol, quote);
    }

    Ok(out)
}

/// Pull a rate out of an FX payload: `price`, then `rate`, then `exchangeRate`,
/// then the bid/ask midpoint, then whichever side is present.
pub(crate) fn extract_fx_price(body: &Value) -> Option<f64> {
    let obj = match body {
        Value::Array(items) => items.first()?,
        other => other,
    };

    for key in ["price", "rate", "exchangeRate"] {
        if let Some(v) = obj.get(key).and_then(Value::as_f64) {
            return Some(v);
        }
    }

    let bid = obj.get("bid").and_then(Value::as_f64);
    let ask = obj.get("ask").and_then(Value::as_f64);
    match (bid, ask) {
        (Some(b), Some(a)) => Some((b + a) / 2.0),
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    }
}

#[async_trait]
impl QuoteProvider for FmpProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        let symbol = symbol.trim().to_uppercase();
        let url = self.endpoint(&["api", "v3", "quote", symbol.as_str()])?;

        let body = self.get_json(url, QUOTE_TIMEOUT).await?;
        let mut quotes = parse_quotes(body, Utc::now())?;

        quotes
            .remove(&symbol)
            .ok_or(ProviderError::NotFound(symbol))
    }

    async fn fetch_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, ProviderError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }

        let joined = symbols.join(",");
        let url = self.endpoint(&["api", "v3", "quote", joined.as_str()])?;
        let body = self.get_json(url, QUOTE_TIMEOUT).await?;
        parse_quotes(body, Utc::now())
    }

    async fn fetch_exchange_rate(&self, pair: &str) -> Result<Option<f64>, ProviderError> {
        let endpoints = [
            self.endpoint(&["api", "v4", "forex", "last", pair])?,
            self.endpoint(&["api", "v3", "forex", pair])?,
        ];

        let mut last_err = None;
        for url in endpoints {
            match self.get_json(url.clone(), FX_TIMEOUT).await {
                Ok(body) => {
                    if let Some(rate) = extract_fx_price(&body).filter(|r| *r > 0.0) {
                        return Ok(Some(rate));
                    }
                    debug!("No usable {} rate from {}", pair, url);
                }
                Err(e) => {
                    debug!("FX request to {} failed: {}", url, e);
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
