use std::fmt;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::errors::SyncError;
use crate::services::quote_service::RetryPolicy;

pub const DEFAULT_NOTION_API_URL: &str = "https://api.notion.com";
pub const DEFAULT_FMP_API_URL: &str = "https://financialmodelingprep.com";
/// Twice on weekdays (sec min hour day month weekday), in UTC: 09:00 and 16:00 KST.
pub const DEFAULT_SCHEDULE: &str = "0 0 0,7 * * Mon-Fri";

/// Column names of the tracked Notion database.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyNames {
    pub ticker: String,
    pub price: String,
    pub previous_close: String,
    pub market_cap: String,
    pub updated_at: String,
    pub name: String,
    pub exchange_rate: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            ticker: "티커".to_string(),
            price: "현재가".to_string(),
            previous_close: "전일종가".to_string(),
            market_cap: "시가총액".to_string(),
            updated_at: "업데이트시간".to_string(),
            name: "종목명".to_string(),
            exchange_rate: "USDKRW".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_url: String,
    pub properties: PropertyNames,
}

#[derive(Clone)]
pub struct FmpConfig {
    pub api_key: String,
    pub api_url: String,
}

const REDACTED: &str = "***";

// Credentials never reach logs or panic messages through `{:?}`.
impl fmt::Debug for NotionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotionConfig")
            .field("token", &REDACTED)
            .field("database_id", &self.database_id)
            .field("api_url", &self.api_url)
            .field("properties", &self.properties)
            .finish()
    }
}

impl fmt::Debug for FmpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmpConfig")
            .field("api_key", &REDACTED)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Everything one sync run needs. Built once in `main` and passed down so the
/// job itself never reads the environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub notion: NotionConfig,
    pub fmp: FmpConfig,
    pub utc_offset_hours: i32,
    pub batch_quotes: bool,
    pub fetch_exchange_rate: bool,
    pub retry: RetryPolicy,
    pub request_spacing: Duration,
    pub schedule: String,
    pub dry_run: bool,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, SyncError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key/value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let missing: Vec<&str> = ["NOTION_TOKEN", "DATABASE_ID", "FMP_API_KEY"]
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::Config(format!("{} must be set", missing.join(", "))));
        }

        let defaults = PropertyNames::default();
        let prop = |key: &str, default: String| get(key).unwrap_or(default);
        let properties = PropertyNames {
            ticker: prop("NOTION_PROP_TICKER", defaults.ticker),
            price: prop("NOTION_PROP_PRICE", defaults.price),
            previous_close: prop("NOTION_PROP_PREVIOUS_CLOSE", defaults.previous_close),
            market_cap: prop("NOTION_PROP_MARKET_CAP", defaults.market_cap),
            updated_at: prop("NOTION_PROP_UPDATED_AT", defaults.updated_at),
            name: prop("NOTION_PROP_NAME", defaults.name),
            exchange_rate: prop("NOTION_PROP_EXCHANGE_RATE", defaults.exchange_rate),
        };

        let default_retry = RetryPolicy::default();

        let config = Self {
            notion: NotionConfig {
                token: get("NOTION_TOKEN").unwrap_or_default(),
                database_id: get("DATABASE_ID").unwrap_or_default(),
                api_url: get("NOTION_API_URL").unwrap_or_else(|| DEFAULT_NOTION_API_URL.to_string()),
                properties,
            },
            fmp: FmpConfig {
                api_key: get("FMP_API_KEY").unwrap_or_default(),
                api_url: get("FMP_API_URL").unwrap_or_else(|| DEFAULT_FMP_API_URL.to_string()),
            },
            utc_offset_hours: parse_or(get("SYNC_TZ_OFFSET_HOURS"), "SYNC_TZ_OFFSET_HOURS", 9)?,
            batch_quotes: parse_or(get("SYNC_BATCH_QUOTES"), "SYNC_BATCH_QUOTES", true)?,
            fetch_exchange_rate: parse_or(get("SYNC_FETCH_FX"), "SYNC_FETCH_FX", true)?,
            retry: RetryPolicy {
                max_attempts: parse_or(get("SYNC_MAX_ATTEMPTS"), "SYNC_MAX_ATTEMPTS", default_retry.max_attempts)?,
                base_delay: Duration::from_millis(parse_or(
                    get("SYNC_RETRY_BASE_MS"),
                    "SYNC_RETRY_BASE_MS",
                    default_retry.base_delay.as_millis() as u64,
                )?),
            },
            request_spacing: Duration::from_millis(parse_or(
                get("SYNC_REQUEST_SPACING_MS"),
                "SYNC_REQUEST_SPACING_MS",
                300,
            )?),
            schedule: get("SYNC_SCHEDULE").unwrap_or_else(|| DEFAULT_SCHEDULE.to_string()),
            dry_run: false,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.notion.token.is_empty() || self.notion.database_id.is_empty() || self.fmp.api_key.is_empty() {
            return Err(SyncError::Config(
                "NOTION_TOKEN, DATABASE_ID, FMP_API_KEY must be set".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config("SYNC_MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(SyncError::Config(format!(
                "SYNC_TZ_OFFSET_HOURS out of range: {}",
                self.utc_offset_hours
            )));
        }
        Ok(())
    }

    pub fn utc_offset(&self) -> FixedOffset {
        // validate() keeps the offset within +-14h, which FixedOffset always accepts
        FixedOffset::east_opt(self.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, SyncError> {
    match value {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| SyncError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
