//! Logging and tracing setup.
//!
//! Logs are written to **stderr** so that stdout stays free for whatever
//! protocol the host speaks with the provider.
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_reconciler::{init_logging, Provider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Initialize logging (reads RUST_LOG and HEMMER_LOG_FORMAT)
//!     init_logging();
//!
//!     let provider = Provider::configure(serde_json::Value::Null)?;
//!     tracing::info!("Provider ready");
//!     provider.stop_on_signal().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls log levels (e.g., `info`, `debug`, `hemmer_reconciler=debug`)
//! - `HEMMER_LOG_FORMAT`: `compact` (default) or `json`
//!
//! # Examples
//!
//! ```bash
//! # Follow every poll attempt
//! RUST_LOG=hemmer_reconciler=debug ./my-provider
//!
//! # One JSON object per line, for log shipping
//! HEMMER_LOG_FORMAT=json ./my-provider
//! ```

use std::fmt as std_fmt;
use std::str::FromStr;

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "HEMMER_LOG_FORMAT";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single lines.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Read the format from `HEMMER_LOG_FORMAT`, falling back to compact.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

impl std_fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std_fmt::Formatter<'_>) -> std_fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

fn output_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .boxed(),
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the default logging subscriber.
///
/// Respects `RUST_LOG` (default `info`) and `HEMMER_LOG_FORMAT`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_format("info", LogFormat::from_env());
}

/// Initialize logging with a custom default level.
///
/// Like [`init_logging`], but `default_level` is used when `RUST_LOG` is not set.
///
/// # Example
///
/// ```ignore
/// use hemmer_reconciler::init_logging_with_default;
///
/// fn main() {
///     // Default to debug level if RUST_LOG is not set
///     init_logging_with_default("debug");
/// }
/// ```
pub fn init_logging_with_default(default_level: &str) {
    init_logging_with_format(default_level, LogFormat::from_env());
}

/// Initialize logging with an explicit level and format.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_format(default_level: &str, format: LogFormat) {
    tracing_subscriber::registry()
        .with(output_layer(format))
        .with(env_filter(default_level))
        .init();
}

/// Try to initialize logging, returning false if already initialized.
///
/// Unlike [`init_logging`], this function does not panic if a subscriber
/// has already been set, which makes it safe to call from tests.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(output_layer(LogFormat::from_env()))
        .with(env_filter("info"))
        .try_init()
        .is_ok()
}
