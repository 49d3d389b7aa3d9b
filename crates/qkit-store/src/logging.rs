//! Log output setup.
//!
//! The store only emits `tracing` events; binaries and tests that want to see
//! them install a subscriber with [`init_tracing`]:
//! - Console output (pretty, for interactive measurements)
//! - JSON lines (for log collection)

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingFormat {
    Console,
    Json,
}

impl TracingFormat {
    fn parse(value: &str) -> TracingFormat {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => TracingFormat::Json,
            _ => TracingFormat::Console,
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter directive, e.g. "info" or "qkit_store=debug".
    pub log_level: String,
    pub format: TracingFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: TracingFormat::Console,
        }
    }
}

impl TracingConfig {
    pub fn new(log_level: impl Into<String>, format: TracingFormat) -> Self {
        Self {
            log_level: log_level.into(),
            format,
        }
    }

    /// Read `RUST_LOG` (default "info") and `QKIT_LOG_FORMAT` ("console" or
    /// "json", default "console").
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let format = lookup("QKIT_LOG_FORMAT").map_or(TracingFormat::Console, |f| TracingFormat::parse(&f));
        Self { log_level, format }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = match config.format {
        TracingFormat::Console => fmt::layer().with_target(true).pretty().boxed(),
        TracingFormat::Json => fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .json()
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("tracing already initialized: {e}")))?;

    tracing::debug!(level = %config.log_level, format = ?config.format, "tracing initialized");
    Ok(())
}

/// [`init_tracing`] with [`TracingConfig::from_env`].
pub fn init_default_tracing() -> Result<()> {
    init_tracing(TracingConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.format, TracingFormat::Console);
    }

    #[test]
    fn lookup_overrides() {
        let config = TracingConfig::from_lookup(|key| match key {
            "RUST_LOG" => Some("qkit_store=debug".into()),
            "QKIT_LOG_FORMAT" => Some("JSON".into()),
            _ => None,
        });
        assert_eq!(config.log_level, "qkit_store=debug");
        assert_eq!(config.format, TracingFormat::Json);
    }

    #[test]
    fn unknown_format_falls_back_to_console() {
        let config = TracingConfig::from_lookup(|key| (key == "QKIT_LOG_FORMAT").then(|| "xml".into()));
        assert_eq!(config.format, TracingFormat::Console);
        assert_eq!(config.log_level, "info");
    }
}
