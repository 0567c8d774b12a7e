use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::external::record_store::RecordStore;
use crate::jobs::stock_sync_job;
use crate::models::SyncReport;
use crate::services::quote_service::QuoteService;
use tokio_cron_scheduler::{JobScheduler, Job};
use tracing::{info, error};
use chrono::Utc;
use std::sync::Arc;

// Context passed to job functions
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<SyncConfig>,
    pub store: Arc<dyn RecordStore>,
    pub quotes: Arc<QuoteService>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobResult {
    pub items_processed: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
}

impl From<&SyncReport> for JobResult {
    fn from(report: &SyncReport) -> Self {
        Self {
            items_processed: report.updated,
            items_skipped: report.skipped,
            items_failed: report.failed(),
        }
    }
}

pub struct JobSchedulerService {
    scheduler: JobScheduler,
    context: JobContext,
}

impl JobSchedulerService {
    pub async fn new(context: JobContext) -> Result<Self, SyncError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| SyncError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self {
            scheduler,
            context,
        })
    }

    /// Start the scheduled stock sync
    pub async fn start(&mut self) -> Result<(), SyncError> {
        info!("🚀 Starting job scheduler...");

        let schedule = self.context.config.schedule.clone();
        self.schedule_job(
            &schedule,
            "stock_sync",
            "Refresh stock prices in Notion",
            stock_sync_job::sync_stocks,
        ).await?;

        self.scheduler.start()
            .await
            .map_err(|e| SyncError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Job scheduler started");
        Ok(())
    }

    /// Stop the scheduler gracefully
    pub async fn stop(&mut self) -> Result<(), SyncError> {
        info!("🛑 Stopping job scheduler...");
        self.scheduler.shutdown()
            .await
            .map_err(|e| SyncError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Job scheduler stopped");
        Ok(())
    }

    /// Helper to schedule a job with tracking
    async fn schedule_job<F, Fut>(
        &mut self,
        schedule: &str,
        job_name: &'static str,
        description: &str,
        job_fn: F,
    ) -> Result<(), SyncError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<JobResult, SyncError>> + Send + 'static,
    {
        let context = self.context.clone();
        let job_fn = Arc::new(job_fn);

        let job = Job::new_async(schedule, move |_uuid, _l| {
            let context = context.clone();
            let job_fn = job_fn.clone();
            Box::pin(async move {
                execute_job_with_tracking(job_name, context, job_fn).await;
            })
        })
        .map_err(|e| SyncError::Config(format!("Invalid schedule for job {}: {}", job_name, e)))?;

        self.scheduler.add(job)
            .await
            .map_err(|e| SyncError::External(format!("Failed to add job {}: {}", job_name, e)))?;

        info!("📅 Scheduled: {} - {} [cron: {}]", job_name, description, schedule);
        Ok(())
    }
}

// Job tracking wrapper. Scheduled runs have nobody to report to, so the
// outcome only goes to the log.
pub async fn execute_job_with_tracking<F, Fut>(
    job_name: &str,
    context: JobContext,
    job_fn: Arc<F>,
) -> Option<JobResult>
where
    F: Fn(JobContext) -> Fut,
    Fut: std::future::Future<Output = Result<JobResult, SyncError>>,
{
    info!("🏃 Starting job: {}", job_name);
    let started_at = Utc::now();

    let result = job_fn(context).await;

    let duration_ms = (Utc::now() - started_at).num_milliseconds();

    match result {
        Ok(job_result) => {
            info!(
                "✅ Job completed: {} (processed: {}, skipped: {}, failed: {}, duration: {}ms)",
                job_name,
                job_result.items_processed,
                job_result.items_skipped,
                job_result.items_failed,
                duration_ms
            );
            Some(job_result)
        }
        Err(e) => {
            error!("❌ Job failed: {} - {} (duration: {}ms)", job_name, e, duration_ms);
            None
        }
    }
}
