//! Background Jobs Module
//!
//! Jobs run once from the command line or on a cron schedule through the job
//! scheduler service.
//!
//! # Available Jobs
//!
//! - `stock_sync_job` - Refreshes prices of the tracked tickers in Notion
//!
//! A job returns a report for the run. Only problems that make the whole run
//! meaningless (bad credentials, unreachable database) are returned as errors.

pub mod stock_sync_job;
