use std::collections::HashMap;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::errors::SyncError;
use crate::external::quote_provider::ProviderError;
use crate::external::record_store::RecordUpdate;
use crate::models::{PriceQuote, SyncFailure, SyncReport, TickerRecord};
use crate::services::job_scheduler_service::{JobContext, JobResult};

pub const FX_PAIR: &str = "USDKRW";

/// Main entry point for the stock sync job.
///
/// This job:
/// 1. Lists every record in the Notion database (fatal on failure)
/// 2. Looks up the USD/KRW rate once
/// 3. Fetches a quote per distinct ticker, in one batch request when allowed
/// 4. Writes price fields back to each record
///
/// Per-record problems are collected into the report, never returned as errors.
pub async fn run_stock_sync(ctx: JobContext) -> Result<SyncReport, SyncError> {
    let config = ctx.config.as_ref();
    let offset = config.utc_offset();
    let started_at = Utc::now();

    info!(
        "🚀 Starting stock sync at {}",
        started_at.with_timezone(&offset).format("%Y-%m-%d %H:%M:%S %:z")
    );

    let mut report = SyncReport::new(started_at);

    let records = ctx.store.list_records().await.map_err(|e| {
        error!("Failed to list records: {}", e);
        SyncError::from(e)
    })?;

    report.total = records.len();
    if records.is_empty() {
        info!("No records in database");
        return Ok(report.finish());
    }
    info!("Found {} records", records.len());

    if config.fetch_exchange_rate {
        report.exchange_rate = ctx.quotes.exchange_rate(FX_PAIR).await;
        if let Some(rate) = report.exchange_rate {
            info!("{}: {:.2}", FX_PAIR, rate);
        }
    }

    let (tracked, blank): (Vec<TickerRecord>, Vec<TickerRecord>) =
        records.into_iter().partition(TickerRecord::has_symbol);

    for record in &blank {
        info!("No ticker, skipping record {}", record.record_id);
        report.skipped += 1;
    }

    if tracked.is_empty() {
        warn!("No records with a ticker");
        return Ok(report.finish());
    }

    let mut symbols: Vec<String> = tracked.iter().map(|r| r.symbol.clone()).collect();
    symbols.sort();
    symbols.dedup();

    let batch = if config.batch_quotes {
        info!("Requesting {} tickers in one batch", symbols.len());
        match ctx.quotes.fetch_batch(&symbols).await {
            Ok(quotes) => Some(quotes),
            Err(e) => {
                warn!("Batch quote request failed ({}), falling back to per-symbol requests", e);
                None
            }
        }
    } else {
        None
    };

    let mut resolved: HashMap<String, Result<PriceQuote, ProviderError>> = HashMap::new();
    let total = tracked.len();

    for (idx, record) in tracked.iter().enumerate() {
        let position = idx + 1;

        let lookup = match resolved.get(&record.symbol) {
            Some(cached) => cached.clone(),
            None => {
                let fetched = resolve_quote(&ctx, batch.as_ref(), &record.symbol).await;
                resolved.insert(record.symbol.clone(), fetched.clone());
                fetched
            }
        };

        let quote = match lookup {
            Ok(quote) => quote,
            Err(e) => {
                let err = SyncError::from_provider(&record.symbol, e);
                warn!("[{}/{}] {} ✗ {}", position, total, record.symbol, err);
                report.record_failure(SyncFailure::from_error(&record.record_id, &record.symbol, &err));
                continue;
            }
        };

        if config.dry_run {
            info!("[{}/{}] {} (dry run) {:.2}", position, total, record.symbol, quote.price);
            report.skipped += 1;
            continue;
        }

        let update = RecordUpdate::from_quote(
            &quote,
            Utc::now().with_timezone(&offset),
            report.exchange_rate,
        );

        match ctx.store.update_record(&record.record_id, &update).await {
            Ok(()) => {
                info!("[{}/{}] {} ✓ {}", position, total, record.symbol, describe(&quote, report.exchange_rate));
                report.updated += 1;
            }
            Err(e) => {
                let err = SyncError::Write {
                    record_id: record.record_id.clone(),
                    message: e.to_string(),
                };
                error!("[{}/{}] {} ✗ {}", position, total, record.symbol, err);
                report.record_failure(SyncFailure::from_error(&record.record_id, &record.symbol, &err));
            }
        }
    }

    let report = report.finish();
    info!("✅ Stock sync finished: {}", report);
    for failure in &report.failures {
        warn!("  {} [{}]: {}", failure.symbol, failure.reason, failure.message);
    }

    Ok(report)
}

/// Scheduler adapter for [`run_stock_sync`].
pub async fn sync_stocks(ctx: JobContext) -> Result<JobResult, SyncError> {
    run_stock_sync(ctx).await.map(|report| JobResult::from(&report))
}

async fn resolve_quote(
    ctx: &JobContext,
    batch: Option<&HashMap<String, PriceQuote>>,
    symbol: &str,
) -> Result<PriceQuote, ProviderError> {
    match batch {
        Some(quotes) => match quotes.get(symbol) {
            Some(quote) if quote.is_usable() => Ok(quote.clone()),
            Some(_) => Err(ProviderError::NotFound(format!("{} has no usable price", symbol))),
            None => Err(ProviderError::NotFound(symbol.to_string())),
        },
        None => ctx.quotes.fetch_with_retry(symbol).await,
    }
}

fn describe(quote: &PriceQuote, exchange_rate: Option<f64>) -> String {
    let mut line = format!("{:.2} ({:+.2}%)", quote.price, quote.change_percent());
    if quote.market_cap_eok > 0 {
        line.push_str(&format!(" | mcap {}억", quote.market_cap_eok));
    }
    if let Some(rate) = exchange_rate {
        line.push_str(&format!(" | {} {:.2}", FX_PAIR, rate));
    }
    line.push_str(&format!(" | {}", quote.name));
    line
}
