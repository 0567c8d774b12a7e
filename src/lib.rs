pub mod config;
pub mod errors;
pub mod external;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod services;
