pub mod fmp;
pub mod notion;
pub mod quote_provider;
pub mod record_store;
