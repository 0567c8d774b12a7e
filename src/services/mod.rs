pub mod job_scheduler_service;
pub mod quote_service;
pub mod rate_limiter;
