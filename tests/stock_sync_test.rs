/// Stock sync job tests
///
/// Drive `run_stock_sync` end to end through in-memory record stores and
/// quote providers. No network access.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use notion_stock_sync::config::{FmpConfig, NotionConfig, PropertyNames, SyncConfig};
use notion_stock_sync::errors::SyncError;
use notion_stock_sync::external::quote_provider::{ProviderError, QuoteProvider};
use notion_stock_sync::external::record_store::{RecordStore, RecordUpdate, StoreError};
use notion_stock_sync::jobs::stock_sync_job::run_stock_sync;
use notion_stock_sync::models::{FailureReason, PriceQuote, TickerRecord};
use notion_stock_sync::services::job_scheduler_service::JobContext;
use notion_stock_sync::services::quote_service::{QuoteService, RetryPolicy};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeStore {
    records: Mutex<Vec<TickerRecord>>,
    updates: Mutex<Vec<(String, RecordUpdate)>>,
    reject_ids: HashSet<String>,
    list_error: Option<fn() -> StoreError>,
}

impl FakeStore {
    fn with_symbols(symbols: &[&str]) -> Self {
        let records = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut record = TickerRecord::new(format!("page-{}", i + 1), s);
                record.last_price = Some(1.0);
                record
            })
            .collect();
        Self {
            records: Mutex::new(records),
            ..Default::default()
        }
    }

    fn price_of(&self, symbol: &str) -> Option<f64> {
        self.records
            .lock()
            .iter()
            .find(|r| r.symbol == symbol)
            .and_then(|r| r.last_price)
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn list_records(&self) -> Result<Vec<TickerRecord>, StoreError> {
        if let Some(make_err) = self.list_error {
            return Err(make_err());
        }
        Ok(self.records.lock().clone())
    }

    async fn update_record(&self, record_id: &str, update: &RecordUpdate) -> Result<(), StoreError> {
        if self.reject_ids.contains(record_id) {
            return Err(StoreError::Rejected("validation_error: schema mismatch".into()));
        }

        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|r| r.record_id == record_id)
            .ok_or_else(|| StoreError::NotFound(record_id.to_string()))?;
        record.last_price = Some(update.price);
        record.last_updated = Some(update.updated_at);

        self.updates.lock().push((record_id.to_string(), update.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct FakeProvider {
    prices: HashMap<String, f64>,
    // number of RateLimited answers to give before answering normally
    throttle: Mutex<HashMap<String, u32>>,
    batch_error: Option<ProviderError>,
    fx_rate: Option<f64>,
    single_calls: Mutex<Vec<String>>,
    batch_calls: Mutex<u32>,
}

impl FakeProvider {
    fn with_prices(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: prices.iter().map(|(s, p)| (s.to_string(), *p)).collect(),
            ..Default::default()
        }
    }

    fn quote(&self, symbol: &str) -> Option<PriceQuote> {
        self.prices.get(symbol).map(|price| {
            PriceQuote::from_raw(symbol, Some(*price), Some(*price * 0.99), None, None, Utc::now())
        })
    }
}

#[async_trait]
impl QuoteProvider for FakeProvider {
    async fn fetch_quote(&self, symbol: &str) -> Result<PriceQuote, ProviderError> {
        self.single_calls.lock().push(symbol.to_string());

        if let Some(remaining) = self.throttle.lock().get_mut(symbol) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ProviderError::RateLimited);
            }
        }

        self.quote(symbol)
            .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))
    }

    async fn fetch_quotes(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, PriceQuote>, ProviderError> {
        *self.batch_calls.lock() += 1;
        if let Some(err) = &self.batch_error {
            return Err(err.clone());
        }
        Ok(symbols
            .iter()
            .filter_map(|s| self.quote(s).map(|q| (s.clone(), q)))
            .collect())
    }

    async fn fetch_exchange_rate(&self, _pair: &str) -> Result<Option<f64>, ProviderError> {
        Ok(self.fx_rate)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config(batch_quotes: bool) -> SyncConfig {
    SyncConfig {
        notion: NotionConfig {
            token: "secret_test".into(),
            database_id: "db".into(),
            api_url: "http://localhost".into(),
            properties: PropertyNames::default(),
        },
        fmp: FmpConfig {
            api_key: "key".into(),
            api_url: "http://localhost".into(),
        },
        utc_offset_hours: 9,
        batch_quotes,
        fetch_exchange_rate: true,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        },
        request_spacing: Duration::ZERO,
        schedule: "0 0 0,7 * * Mon-Fri".into(),
        dry_run: false,
    }
}

fn context(config: SyncConfig, store: Arc<FakeStore>, provider: Arc<FakeProvider>) -> JobContext {
    let quotes = QuoteService::new(provider, config.retry, None);
    JobContext {
        config: Arc::new(config),
        store,
        quotes: Arc::new(quotes),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_all_lookups_succeed() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL", "MSFT", "NVDA"]));
    let provider = Arc::new(FakeProvider::with_prices(&[
        ("AAPL", 191.23),
        ("MSFT", 402.11),
        ("NVDA", 880.0),
    ]));

    let report = run_stock_sync(context(config(false), store.clone(), provider))
        .await
        .unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.updated, 3);
    assert!(report.failures.is_empty());
    assert_eq!(store.price_of("MSFT"), Some(402.11));
    assert!(report.finished_at.is_some());
}

#[tokio::test]
async fn test_unknown_symbol_is_reported_and_left_unchanged() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL", "MSFT", "XXXX"]));
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 191.23), ("MSFT", 402.11)]));

    let report = run_stock_sync(context(config(false), store.clone(), provider))
        .await
        .unwrap();

    assert_eq!(report.updated, 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].symbol, "XXXX");
    assert_eq!(report.failures[0].reason, FailureReason::Lookup);
    assert_eq!(store.price_of("XXXX"), Some(1.0));
    assert_eq!(store.price_of("AAPL"), Some(191.23));
}

#[tokio::test]
async fn test_rate_limit_then_success_is_updated() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL"]));
    let provider = FakeProvider::with_prices(&[("AAPL", 191.23)]);
    provider.throttle.lock().insert("AAPL".into(), 1);
    let provider = Arc::new(provider);

    let report = run_stock_sync(context(config(false), store.clone(), provider.clone()))
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert!(report.failures.is_empty());
    assert_eq!(provider.single_calls.lock().len(), 2);
}

#[tokio::test]
async fn test_persistent_rate_limit_is_recorded_and_run_continues() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL", "MSFT"]));
    let provider = FakeProvider::with_prices(&[("AAPL", 191.23), ("MSFT", 402.11)]);
    provider.throttle.lock().insert("AAPL".into(), 10);
    let provider = Arc::new(provider);

    let report = run_stock_sync(context(config(false), store.clone(), provider.clone()))
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].reason, FailureReason::RateLimited);
    // bounded: three attempts for AAPL, one for MSFT
    assert_eq!(provider.single_calls.lock().len(), 4);
}

#[tokio::test]
async fn test_rejected_write_is_recorded() {
    let mut store = FakeStore::with_symbols(&["AAPL", "MSFT"]);
    store.reject_ids.insert("page-2".into());
    let store = Arc::new(store);
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 191.23), ("MSFT", 402.11)]));

    let report = run_stock_sync(context(config(false), store.clone(), provider))
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].reason, FailureReason::Write);
    assert_eq!(report.failures[0].record_id, "page-2");
    assert_eq!(store.price_of("MSFT"), Some(1.0));
}

#[tokio::test]
async fn test_unauthorized_listing_is_fatal_config_error() {
    let store = Arc::new(FakeStore {
        list_error: Some(|| StoreError::Unauthorized("API token is invalid.".into())),
        ..Default::default()
    });
    let provider = Arc::new(FakeProvider::default());

    let err = run_stock_sync(context(config(true), store, provider))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_network_listing_failure_is_fatal() {
    let store = Arc::new(FakeStore {
        list_error: Some(|| StoreError::Network("connection reset".into())),
        ..Default::default()
    });
    let provider = Arc::new(FakeProvider::default());

    let err = run_stock_sync(context(config(true), store, provider))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Store(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_blank_tickers_are_skipped() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL", "  "]));
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 191.23)]));

    let report = run_stock_sync(context(config(true), store, provider))
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn test_empty_database() {
    let store = Arc::new(FakeStore::default());
    let provider = Arc::new(FakeProvider::default());

    let report = run_stock_sync(context(config(true), store, provider.clone()))
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(*provider.batch_calls.lock(), 0);
}

#[tokio::test]
async fn test_batch_covers_all_symbols_in_one_request() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL", "MSFT", "XXXX", "AAPL"]));
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 191.23), ("MSFT", 402.11)]));

    let report = run_stock_sync(context(config(true), store, provider.clone()))
        .await
        .unwrap();

    assert_eq!(*provider.batch_calls.lock(), 1);
    assert!(provider.single_calls.lock().is_empty());
    assert_eq!(report.updated, 3);
    assert_eq!(report.failed_symbols(), vec!["XXXX"]);
}

#[tokio::test]
async fn test_forbidden_batch_falls_back_to_single_requests() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL", "MSFT"]));
    let mut provider = FakeProvider::with_prices(&[("AAPL", 191.23), ("MSFT", 402.11)]);
    provider.batch_error = Some(ProviderError::Forbidden("403 Forbidden".into()));
    let provider = Arc::new(provider);

    let report = run_stock_sync(context(config(true), store, provider.clone()))
        .await
        .unwrap();

    assert_eq!(report.updated, 2);
    let mut calls = provider.single_calls.lock().clone();
    calls.sort();
    assert_eq!(calls, vec!["AAPL".to_string(), "MSFT".to_string()]);
}

#[tokio::test]
async fn test_duplicate_symbols_are_fetched_once() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL", "AAPL"]));
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 191.23)]));

    let report = run_stock_sync(context(config(false), store, provider.clone()))
        .await
        .unwrap();

    assert_eq!(report.updated, 2);
    assert_eq!(provider.single_calls.lock().len(), 1);
}

#[tokio::test]
async fn test_exchange_rate_and_timestamp_are_written() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL"]));
    let mut provider = FakeProvider::with_prices(&[("AAPL", 191.23)]);
    provider.fx_rate = Some(1350.25);
    let provider = Arc::new(provider);

    let report = run_stock_sync(context(config(true), store.clone(), provider))
        .await
        .unwrap();

    assert_eq!(report.exchange_rate, Some(1350.25));
    let updates = store.updates.lock();
    let (_, update) = &updates[0];
    assert_eq!(update.exchange_rate, Some(1350.25));
    assert_eq!(update.updated_at.offset().local_minus_utc(), 9 * 3600);
    assert!((update.previous_close - 191.23 * 0.99).abs() < 1e-9);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let store = Arc::new(FakeStore::with_symbols(&["AAPL"]));
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 191.23)]));
    let mut cfg = config(true);
    cfg.dry_run = true;

    let report = run_stock_sync(context(cfg, store.clone(), provider))
        .await
        .unwrap();

    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped, 1);
    assert!(store.updates.lock().is_empty());
    assert_eq!(store.price_of("AAPL"), Some(1.0));
}
