use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use notion_stock_sync::config::SyncConfig;
use notion_stock_sync::external::fmp::FmpProvider;
use notion_stock_sync::external::notion::NotionStore;
use notion_stock_sync::jobs::stock_sync_job;
use notion_stock_sync::logging::{init_logging, LoggingConfig};
use notion_stock_sync::services::job_scheduler_service::{JobContext, JobSchedulerService};
use notion_stock_sync::services::quote_service::QuoteService;
use notion_stock_sync::services::rate_limiter::RateLimiter;

/// Refresh stock prices in a Notion database from Financial Modeling Prep.
#[derive(Debug, Parser)]
#[command(name = "notion-stock-sync", version)]
struct Args {
    /// Keep running and sync on the cron schedule from SYNC_SCHEDULE
    #[arg(long)]
    schedule: bool,

    /// Fetch quotes but do not write anything to Notion
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = setup_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn setup_logging() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::from_env()?)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = SyncConfig::from_env()?;
    config.dry_run = args.dry_run;

    let context = build_context(config);

    if args.schedule {
        let mut scheduler = JobSchedulerService::new(context).await?;
        scheduler.start().await?;

        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C");
        scheduler.stop().await?;
        return Ok(());
    }

    let report = stock_sync_job::run_stock_sync(context).await?;
    info!(
        "Done in {}ms: {}",
        report.duration_ms().unwrap_or_default(),
        report
    );
    Ok(())
}

fn build_context(config: SyncConfig) -> JobContext {
    let limiter = Arc::new(RateLimiter::new(1, config.request_spacing));
    let provider = Arc::new(FmpProvider::new(&config.fmp));
    let quotes = QuoteService::new(provider, config.retry, Some(limiter));
    let store = Arc::new(NotionStore::new(&config.notion));

    JobContext {
        config: Arc::new(config),
        store,
        quotes: Arc::new(quotes),
    }
}
