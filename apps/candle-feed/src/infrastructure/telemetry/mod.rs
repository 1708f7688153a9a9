//! Structured Logging
//!
//! Installs a `tracing` subscriber with an environment-driven filter and a
//! human-readable or JSON formatter.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Filter directives, merged over the defaults below
//! - `LOG_FORMAT`: `text` (default) or `json`
//!
//! # Usage
//!
//! ```ignore
//! use candle_feed::infrastructure::telemetry;
//!
//! telemetry::init();
//! tracing::info!(room = "price:abc", "joined");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directives applied on top of `RUST_LOG`.
const DEFAULT_DIRECTIVES: [&str; 4] = [
    "candle_feed=info",
    "tungstenite=warn",
    "hyper=warn",
    "reqwest=warn",
];

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// Parse from a string (case-insensitive). Unknown values are text.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Log line format.
    pub format: LogFormat,
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            format: std::env::var("LOG_FORMAT")
                .map(|v| LogFormat::from_str_lossy(&v))
                .unwrap_or_default(),
        }
    }
}

/// Initialize logging from the environment.
pub fn init() {
    init_with_config(&TelemetryConfig::from_env());
}

/// Initialize logging with a custom configuration.
///
/// A subscriber that is already installed is left in place.
pub fn init_with_config(config: &TelemetryConfig) {
    let env_filter = build_filter();

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let result = match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

fn build_filter() -> EnvFilter {
    DEFAULT_DIRECTIVES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

// =============================================================================
// Tests
// =============================================================================
