use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::time::{sleep as async_sleep, Duration};
use tracing::{debug, warn};

use crate::external::quote_provider::{ProviderError, QuoteProvider};
use crate::models::PriceQuote;
use crate::services::rate_limiter::RateLimiter;

/// Bounded retry for rate-limited provider calls. Attempt `n` that gets
/// throttled waits `base_delay * n` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Saturates instead of overflowing for huge configured base delays.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.checked_mul(attempt).unwrap_or(Duration::MAX)
    }
}

pub struct QuoteService {
    provider: Arc<dyn QuoteProvider>,
    retry: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
}

impl QuoteService {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        retry: RetryPolicy,
        limiter: Option<Arc<RateLimiter>>,
    ) -> Self {
        Self { provider, retry, limiter }
    }

    async fn with_retry<T, F, Fut>(&self, label: &str, op: F) -> Result<T, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let guard = match &self.limiter {
                Some(limiter) => Some(limiter.acquire().await),
                None => None,
            };
            let result = op().await;
            drop(guard);

            match result {
                Err(ProviderError::RateLimited) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Rate limited for {}, retrying in {}ms (attempt {}/{})",
                        label,
                        delay.as_millis(),
                        attempt,
                        self.retry.max_attempts
                    );
                    async_sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    /// Current quote for one symbol. A quote without a positive price counts
    /// as not found.
    pub async fn fetch_with_retry(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        let quote = self
            .with_retry(symbol, || self.provider.fetch_quote(symbol))
            .await?;

        if quote.is_usable() {
            Ok(quote)
        } else {
            Err(ProviderError::NotFound(format!("{} has no usable price", symbol)))
        }
    }

    pub async fn fetch_batch(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, ProviderError> {
        let label = format!("batch of {} symbols", symbols.len());
        self.with_retry(&label, || self.provider.fetch_quotes(symbols))
            .await
    }

    /// Exchange rate lookups never fail the run; problems are only logged.
    pub async fn exchange_rate(&self, pair: &str) -> Option<f64> {
        match self.with_retry(pair, || self.provider.fetch_exchange_rate(pair)).await {
            Ok(Some(rate)) if rate > 0.0 => Some(rate),
            Ok(_) => {
                debug!("No {} rate available", pair);
                None
            }
            Err(e) => {
                warn!("Failed to fetch {} rate: {}", pair, e);
                None
            }
        }
    }
}
