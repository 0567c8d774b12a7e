use thiserror::Error;

use crate::external::quote_provider::ProviderError;
use crate::external::record_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Lookup failed for {symbol}: {message}")]
    Lookup { symbol: String, message: String },
    #[error("Rate limited while fetching {0}")]
    RateLimited(String),
    #[error("Write rejected for record {record_id}: {message}")]
    Write { record_id: String, message: String },
    #[error("Record store error: {0}")]
    Store(StoreError),
    #[error("External error: {0}")]
    External(String),
}

impl SyncError {
    /// Fatal errors abort the run and make the process exit non-zero.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Config(_) | SyncError::Store(_) | SyncError::External(_))
    }

    pub fn from_provider(symbol: &str, err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited => SyncError::RateLimited(symbol.to_string()),
            other => SyncError::Lookup {
                symbol: symbol.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unauthorized(msg) => {
                SyncError::Config(format!("database credential rejected: {}", msg))
            }
            StoreError::NotFound(msg) => {
                SyncError::Config(format!("database not found or not shared: {}", msg))
            }
            other => SyncError::Store(other),
        }
    }
}
