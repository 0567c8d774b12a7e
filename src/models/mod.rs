mod price_quote;
mod sync_report;
mod ticker_record;

pub use price_quote::{PriceQuote, EOK};
pub use sync_report::{FailureReason, SyncFailure, SyncReport};
pub use ticker_record::{normalize_symbol, TickerRecord};
