#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Candle Feed - Real-time Chart Data
//!
//! Maintains a room-based streaming session against a market data service
//! and folds its price and transaction events into OHLCV bars for a charting
//! front end.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure data and rules
//!   - `room`: Room names and channel routing
//!   - `subscription`: Room registry and event de-duplication
//!   - `resolution`: Resolution tokens and bucket widths
//!   - `aggregation`: Bar engine and volume bucket cache
//!   - `market`: Bars, trades and trade markers
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Stream, data API, wallet source and consumer interfaces
//!   - `services`: The chart feed
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: Two-channel WebSocket session with heartbeat and reconnect
//!   - `broadcast`: Room listener fan-out
//!   - `http`: Data API client
//!   - `config`, `telemetry`, `metrics`: Ambient concerns
//!
//! # Data Flow
//!
//! ```text
//! general WS ─────┐     ┌──────────────┐     ┌─────────────┐     ┌───────────┐
//!                 ├────►│ StreamSession│────►│ ListenerHub │────►│ ChartFeed │──► consumer
//! transaction WS ─┘     └──────────────┘     └─────────────┘     └───────────┘
//!                                                                     ▲
//! data API (history, trades) ─────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Rooms, bars and aggregation rules.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::aggregation::{BarEngine, Skip, VolumeBucketCache};
pub use domain::market::{Bar, TradeMark, TradeRecord, TradeSide};
pub use domain::resolution::{ResolutionSpec, SUPPORTED_RESOLUTIONS, resolve};
pub use domain::room::{Channel, Room};

// Application
pub use application::ports::{
    BarConsumer, FetchError, HistoricalFetcher, HistoryBatch, HistoryRequest, RoomStream,
    TradeHistory, WalletSource, WatchedWallets,
};
pub use application::services::{ChartFeed, ChartFeedConfig, FeedError};

// Infrastructure config
pub use infrastructure::config::{ConfigError, FeedConfig};

// Streaming session (for integration tests)
pub use infrastructure::stream::{
    HeartbeatConfig, ReconnectConfig, SessionConfig, SessionStatus, StreamSession,
};

// Adapters
pub use infrastructure::consumer::TracingBarConsumer;
pub use infrastructure::http::DataApiClient;
pub use infrastructure::wallets::ActiveWallets;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};
