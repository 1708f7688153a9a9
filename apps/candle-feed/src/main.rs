//! Candle Feed Binary
//!
//! Streams live bars and trade markers for one token/pool pair and logs
//! them.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin candle-feed
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATASTREAM_URL`: WebSocket endpoint of the data stream
//! - `DATA_API_KEY`: Data API key
//! - `CHART_TOKEN`: Token identifier
//! - `CHART_POOL`: Pool identifier
//!
//! ## Optional
//! - `DATASTREAM_TRANSACTION_URL`: Endpoint for the transaction channel
//!   (default: `DATASTREAM_URL`)
//! - `DATA_API_URL`: Data API base URL (default: <https://data.solanatracker.io>)
//! - `CHART_SYMBOL`: Display symbol (default: `CHART_TOKEN`)
//! - `CHART_RESOLUTION`: Resolution token (default: 1S)
//! - `CHART_WALLET` / `CHART_DEPLOYER`: Wallets whose trades are marked
//! - `RECONNECT_DELAY_BASE_MS` / `RECONNECT_DELAY_MAX_MS` /
//!   `RECONNECT_JITTER_FACTOR`: Reconnect backoff (default: 2500 / 4500 / 0.5)
//! - `WALLET_POLL_INTERVAL_MS`: Wallet selection poll period (default: 1000)
//! - `RATE_LIMIT_RETRY_DELAY_MS`: Wait before retrying a 429 (default: 2000)
//! - `HTTP_TIMEOUT_SECS`: Data API timeout (default: 10)
//! - `HISTORY_CAPACITY`: Superseded bars kept per symbol (default: 5000)
//! - `METRICS_PORT`: Prometheus listener port (default: 0, disabled)
//! - `LOG_FORMAT`: text | json (default: text)
//! - `RUST_LOG`: Log filter (default: `candle_feed=info`)

use std::sync::Arc;

use candle_feed::infrastructure::telemetry;
use candle_feed::{
    ActiveWallets, ChartFeed, ChartFeedConfig, DataApiClient, FeedConfig, SessionConfig,
    StreamSession, TracingBarConsumer, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Subscriber id of the binary's own bar subscription.
const SUBSCRIBER_ID: &str = "candle-feed";

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();
    telemetry::init();

    tracing::info!("Starting candle feed");

    let config = FeedConfig::from_env()?;
    init_metrics(config.metrics_port)?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let session = Arc::new(StreamSession::start(
        SessionConfig::from(&config.stream),
        shutdown_token.child_token(),
    ));
    let api = Arc::new(DataApiClient::new(&config.api)?);
    let wallets = Arc::new(ActiveWallets::new(
        config.chart.wallet.clone(),
        config.chart.deployer.clone(),
    ));

    let feed = ChartFeed::new(
        ChartFeedConfig::from(&config.chart),
        Arc::clone(&session),
        Arc::clone(&api),
        api,
        wallets,
        Arc::new(TracingBarConsumer::new()),
        shutdown_token.child_token(),
    );

    tracing::info!(resolutions = ?feed.supported_resolutions(), "Feed ready");

    let now = chrono::Utc::now().timestamp();
    let request = feed.history_request(0, now, true);
    if let Err(e) = feed.get_bars(&request).await {
        tracing::warn!(error = %e, "Continuing without history");
    }

    feed.subscribe_bars(SUBSCRIBER_ID);
    feed.start_marks();

    await_shutdown().await;

    feed.shutdown();
    session.disconnect();
    // Let the driver flush the disconnect before the links are cancelled.
    tokio::task::yield_now().await;
    shutdown_token.cancel();

    tracing::info!("Candle feed stopped");
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        token = %config.chart.token,
        pool = %config.chart.pool,
        symbol = %config.chart.symbol,
        resolution = %config.chart.resolution,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        general_url = %config.stream.general_url,
        transaction_url = %config.stream.transaction_url,
        api_url = %config.api.base_url,
        api_key = ?config.api.api_key,
        "Endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
