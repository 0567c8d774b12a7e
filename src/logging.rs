//! Console logging through `tracing-subscriber`, with an optional Loki sink.
//!
//! `RUST_LOG` sets the filter. Shipping to Loki is opt-in through
//! `LOKI_ENABLED=true` plus `LOKI_URL`, and only does anything when the
//! crate is built with the `loki` feature.

use std::error::Error;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_SERVICE: &str = "notion-stock-sync";

/// Where and how to ship logs to Loki.
#[derive(Debug, Clone, PartialEq)]
pub struct LokiTarget {
    pub url: String,
    pub service_name: String,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub log_level: String,
    pub loki: Option<LokiTarget>,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Enabling Loki without a URL is an error rather than a silent fallback.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let enabled = matches!(
            lookup("LOKI_ENABLED").as_deref().map(str::trim),
            Some("true") | Some("1")
        );
        if !enabled {
            return Ok(Self { log_level, loki: None });
        }

        let url = lookup("LOKI_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| "LOKI_ENABLED is true but LOKI_URL is not set".to_string())?;

        Ok(Self {
            log_level,
            loki: Some(LokiTarget {
                url,
                service_name: lookup("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE.to_string()),
                environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            }),
        })
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn Error>> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::new(&config.log_level))
        .with(tracing_subscriber::fmt::layer());

    #[cfg(feature = "loki")]
    {
        let loki_layer = match &config.loki {
            Some(target) => Some(spawn_loki(target)?),
            None => None,
        };
        registry.with(loki_layer).try_init()?;
    }

    #[cfg(not(feature = "loki"))]
    registry.try_init()?;

    match &config.loki {
        Some(target) if cfg!(feature = "loki") => {
            tracing::info!("✅ Loki logging initialized at {}", target.url)
        }
        Some(_) => tracing::warn!("LOKI_ENABLED is set but this build has no `loki` feature"),
        None => tracing::debug!("Console-only logging initialized"),
    }

    Ok(())
}

#[cfg(feature = "loki")]
fn spawn_loki(target: &LokiTarget) -> Result<tracing_loki::Layer, Box<dyn Error>> {
    let url = url::Url::parse(&target.url)?;

    let (layer, task) = tracing_loki::builder()
        .label("service", &target.service_name)?
        .label("environment", &target.environment)?
        .build_url(url)?;

    // Ships buffered events in the background for the life of the runtime.
    tokio::spawn(task);

    Ok(layer)
}
