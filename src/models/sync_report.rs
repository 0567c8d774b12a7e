use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    Lookup,
    RateLimited,
    Write,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureReason::Lookup => "LookupError",
            FailureReason::RateLimited => "RateLimitError",
            FailureReason::Write => "WriteError",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFailure {
    pub record_id: String,
    pub symbol: String,
    pub reason: FailureReason,
    pub message: String,
}

impl SyncFailure {
    /// Classify a per-record error. Fatal errors never reach the report.
    pub fn from_error(record_id: &str, symbol: &str, err: &SyncError) -> Self {
        let reason = match err {
            SyncError::RateLimited(_) => FailureReason::RateLimited,
            SyncError::Write { .. } => FailureReason::Write,
            _ => FailureReason::Lookup,
        };

        Self {
            record_id: record_id.to_string(),
            symbol: symbol.to_string(),
            reason,
            message: err.to_string(),
        }
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub total: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failures: Vec<SyncFailure>,
    pub exchange_rate: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            updated: 0,
            skipped: 0,
            failures: Vec::new(),
            exchange_rate: None,
            started_at,
            finished_at: None,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.symbol.as_str()).collect()
    }

    pub fn record_failure(&mut self, failure: SyncFailure) {
        self.failures.push(failure);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updated: {} | skipped: {} | failed: {} | total: {}",
            self.updated,
            self.skipped,
            self.failed(),
            self.total
        )
    }
}
