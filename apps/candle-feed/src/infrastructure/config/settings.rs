//! Feed Configuration Settings
//!
//! Configuration types for the candle feed, loaded from environment variables.
//! Parsing runs over a lookup function so it can be exercised without touching
//! the process environment.

use std::time::Duration;

use crate::application::services::ChartFeedConfig;
use crate::domain::aggregation::DEFAULT_HISTORY_CAPACITY;
use crate::infrastructure::stream::heartbeat::HeartbeatConfig;
use crate::infrastructure::stream::reconnect::ReconnectConfig;

/// Default data API base URL.
pub const DEFAULT_DATA_API_URL: &str = "https://data.solanatracker.io";

/// Default resolution token.
pub const DEFAULT_RESOLUTION: &str = "1S";

/// Data API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// The raw key, for request headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Streaming endpoint settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// Endpoint for the general channel.
    pub general_url: String,
    /// Endpoint for the transaction channel.
    pub transaction_url: String,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay_base: Duration,
    /// Cap on the pre-jitter reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Jitter added on top of the delay, as a fraction of it.
    pub reconnect_jitter_factor: f64,
    /// Interval between link pings.
    pub heartbeat_interval: Duration,
    /// Silence after a ping before a link is dropped.
    pub heartbeat_timeout: Duration,
    /// Limit on a WebSocket handshake.
    pub connect_timeout: Duration,
}

impl StreamSettings {
    /// Settings for one endpoint shared by both channels, with default
    /// backoff and heartbeat.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let reconnect = ReconnectConfig::default();
        let heartbeat = HeartbeatConfig::default();
        Self {
            transaction_url: url.clone(),
            general_url: url,
            reconnect_delay_base: reconnect.base_delay,
            reconnect_delay_max: reconnect.max_delay,
            reconnect_jitter_factor: reconnect.jitter_factor,
            heartbeat_interval: heartbeat.ping_interval,
            heartbeat_timeout: heartbeat.pong_timeout,
            connect_timeout: heartbeat.connect_timeout,
        }
    }

    /// Backoff configuration for the session.
    #[must_use]
    pub const fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::new(
            self.reconnect_delay_base,
            self.reconnect_delay_max,
            self.reconnect_jitter_factor,
        )
    }

    /// Link heartbeat configuration for the session.
    #[must_use]
    pub const fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig::new(
            self.heartbeat_interval,
            self.heartbeat_timeout,
            self.connect_timeout,
        )
    }
}

/// Data API settings.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL, without trailing slash.
    pub base_url: String,
    /// Key sent as `x-api-key`.
    pub api_key: ApiKey,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Wait before retrying a rate-limited request.
    pub rate_limit_retry_delay: Duration,
}

impl ApiSettings {
    /// Settings with default timeout and retry delay.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: ApiKey::new(api_key.into()),
            timeout: Duration::from_secs(10),
            rate_limit_retry_delay: Duration::from_secs(2),
        }
    }
}

/// The instrument being charted.
#[derive(Debug, Clone)]
pub struct ChartSettings {
    /// Token identifier.
    pub token: String,
    /// Pool identifier.
    pub pool: String,
    /// Display symbol; also the bar cache key.
    pub symbol: String,
    /// Resolution token.
    pub resolution: String,
    /// Wallet whose trades are marked.
    pub wallet: Option<String>,
    /// Deployer whose trades are marked.
    pub deployer: Option<String>,
    /// How often the active wallet/deployer is re-read.
    pub wallet_poll_interval: Duration,
    /// Superseded bars retained per symbol.
    pub history_capacity: usize,
}

impl ChartSettings {
    /// Settings for a token/pool with the symbol defaulting to the token.
    #[must_use]
    pub fn new(token: impl Into<String>, pool: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            symbol: token.clone(),
            token,
            pool: pool.into(),
            resolution: DEFAULT_RESOLUTION.to_string(),
            wallet: None,
            deployer: None,
            wallet_poll_interval: Duration::from_secs(1),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl From<&ChartSettings> for ChartFeedConfig {
    fn from(chart: &ChartSettings) -> Self {
        Self {
            token: chart.token.clone(),
            pool: chart.pool.clone(),
            symbol: chart.symbol.clone(),
            resolution: chart.resolution.clone(),
            wallet_poll_interval: chart.wallet_poll_interval,
            history_capacity: chart.history_capacity,
        }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Streaming endpoints.
    pub stream: StreamSettings,
    /// Data API access.
    pub api: ApiSettings,
    /// Charted instrument.
    pub chart: ChartSettings,
    /// Prometheus listener port (0 = no listener).
    pub metrics_port: u16,
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stream_url = required(&lookup, "DATASTREAM_URL")?;
        let api_key = required(&lookup, "DATA_API_KEY")?;
        let token = required(&lookup, "CHART_TOKEN")?;
        let pool = required(&lookup, "CHART_POOL")?;

        let mut stream = StreamSettings::new(stream_url);
        if let Some(url) = optional(&lookup, "DATASTREAM_TRANSACTION_URL") {
            stream.transaction_url = url;
        }
        stream.reconnect_delay_base = parse_duration_millis(
            &lookup,
            "RECONNECT_DELAY_BASE_MS",
            stream.reconnect_delay_base,
        );
        stream.reconnect_delay_max =
            parse_duration_millis(&lookup, "RECONNECT_DELAY_MAX_MS", stream.reconnect_delay_max);
        stream.reconnect_jitter_factor = parse_or(
            &lookup,
            "RECONNECT_JITTER_FACTOR",
            stream.reconnect_jitter_factor,
        );
        if !(0.0..=10.0).contains(&stream.reconnect_jitter_factor) {
            return Err(ConfigError::InvalidValue {
                key: "RECONNECT_JITTER_FACTOR".to_string(),
                value: stream.reconnect_jitter_factor.to_string(),
            });
        }
        stream.heartbeat_interval =
            parse_duration_secs(&lookup, "HEARTBEAT_INTERVAL_SECS", stream.heartbeat_interval);
        stream.heartbeat_timeout =
            parse_duration_secs(&lookup, "HEARTBEAT_TIMEOUT_SECS", stream.heartbeat_timeout);
        stream.connect_timeout =
            parse_duration_secs(&lookup, "CONNECT_TIMEOUT_SECS", stream.connect_timeout);

        let base_url =
            optional(&lookup, "DATA_API_URL").unwrap_or_else(|| DEFAULT_DATA_API_URL.to_string());
        let mut api = ApiSettings::new(base_url, api_key);
        api.timeout = parse_duration_secs(&lookup, "HTTP_TIMEOUT_SECS", api.timeout);
        api.rate_limit_retry_delay = parse_duration_millis(
            &lookup,
            "RATE_LIMIT_RETRY_DELAY_MS",
            api.rate_limit_retry_delay,
        );

        let mut chart = ChartSettings::new(token, pool);
        if let Some(symbol) = optional(&lookup, "CHART_SYMBOL") {
            chart.symbol = symbol;
        }
        if let Some(resolution) = optional(&lookup, "CHART_RESOLUTION") {
            chart.resolution = resolution;
        }
        chart.wallet = optional(&lookup, "CHART_WALLET");
        chart.deployer = optional(&lookup, "CHART_DEPLOYER");
        chart.wallet_poll_interval = parse_duration_millis(
            &lookup,
            "WALLET_POLL_INTERVAL_MS",
            chart.wallet_poll_interval,
        );
        chart.history_capacity = parse_or(&lookup, "HISTORY_CAPACITY", chart.history_capacity);

        Ok(Self {
            stream,
            api,
            chart,
            metrics_port: parse_or(&lookup, "METRICS_PORT", 0),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable is out of range.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
