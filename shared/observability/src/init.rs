//! Tracing subscriber setup.

use std::env;
use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Attached to the startup event so aggregated logs can be attributed.
    pub service_name: String,
    pub format: LogFormat,
    /// Fallback filter when `RUST_LOG` is unset, e.g. `info` or `authgate_auth=debug,info`.
    pub level: String,
    pub include_location: bool,
}

impl TracingConfig {
    /// Defaults read from `LOG_FORMAT`, `RUST_LOG` and `LOG_LOCATION`.
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            format: env::var("LOG_FORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LogFormat::Pretty),
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            include_location: env::var("LOG_LOCATION").map(|v| v == "true").unwrap_or(false),
        }
    }
}

/// Install the global subscriber. A second call is a no-op, which keeps test
/// binaries that initialise tracing per test from panicking.
pub fn init_tracing(config: &TracingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()
            .is_ok(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_file(config.include_location)
                    .with_line_number(config.include_location),
            )
            .try_init()
            .is_ok(),
    };

    if installed {
        tracing::info!(
            service = %config.service_name,
            format = ?config.format,
            "Tracing initialized"
        );
    }
}
