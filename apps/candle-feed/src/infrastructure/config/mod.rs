//! Configuration Module
//!
//! Configuration loading for the candle feed.

mod settings;

pub use settings::{ApiKey, ApiSettings, ChartSettings, ConfigError, FeedConfig, StreamSettings};
