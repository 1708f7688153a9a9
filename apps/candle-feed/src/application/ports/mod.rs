//! Port Interfaces
//!
//! Contracts between the chart feed and the systems around it, following
//! the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - `RoomStream`: Room subscriptions over the streaming session
//! - `HistoricalFetcher`: Historical candles for seeding
//! - `TradeHistory`: Past trades of one wallet, for markers
//! - `WalletSource`: The wallet/deployer currently being followed
//!
//! ## Driver Ports (Inbound)
//!
//! - `BarConsumer`: Receives bars, history batches and markers

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::market::{Bar, TradeMark, TradeRecord};
use crate::domain::room::Room;

// =============================================================================
// Room Stream
// =============================================================================

/// Identifier of one room listener.
pub type ListenerId = u64;

/// Receiving end of a room listener.
#[derive(Debug)]
pub struct RoomListener {
    id: ListenerId,
    room: Room,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl RoomListener {
    /// Wrap a receiver registered under `id`.
    #[must_use]
    pub const fn new(id: ListenerId, room: Room, rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { id, room, rx }
    }

    /// Identifier used to detach the listener.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Room this listener is attached to.
    #[must_use]
    pub const fn room(&self) -> &Room {
        &self.room
    }

    /// Wait for the next event. `None` once the listener is detached.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take an event if one is queued.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

/// Room subscriptions over a shared streaming session.
pub trait RoomStream: Send + Sync {
    /// Make sure both channels are connecting or connected.
    fn connect(&self);

    /// Register a room.
    fn join_room(&self, room: Room);

    /// Unregister a room.
    fn leave_room(&self, room: Room);

    /// Attach a listener to a room.
    fn on(&self, room: &Room) -> RoomListener;

    /// Detach a listener.
    fn off(&self, room: &Room, id: ListenerId) -> bool;
}

// =============================================================================
// Historical Data
// =============================================================================

/// A request for historical candles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Token identifier.
    pub token: String,
    /// Pool identifier.
    pub pool: String,
    /// Resolution token. Fetchers whose source has a fixed granularity may
    /// ignore it.
    pub resolution: String,
    /// Range start, unix seconds. Advisory, like `to`.
    pub from: i64,
    /// Range end, unix seconds.
    pub to: i64,
    /// Whether this is the first request of a subscription.
    pub first_data_request: bool,
}

/// History delivered to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryBatch {
    /// Ascending candles.
    Bars(Vec<Bar>),
    /// Nothing available for the request.
    NoData,
}

impl HistoryBatch {
    /// Wrap candles, mapping an empty sequence to [`HistoryBatch::NoData`].
    #[must_use]
    pub fn from_bars(bars: Vec<Bar>) -> Self {
        if bars.is_empty() {
            Self::NoData
        } else {
            Self::Bars(bars)
        }
    }

    /// Whether this is the no-data signal.
    #[must_use]
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }
}

/// Data API errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request could not be sent or the body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Still rate limited after the single retry.
    #[error("rate limited by data API")]
    RateLimited,

    /// Non-success status other than 429.
    #[error("data API returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Body did not match the expected shape.
    #[error("failed to decode data API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Source of historical candles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoricalFetcher: Send + Sync {
    /// Fetch ascending candles. An empty vector means no data.
    async fn fetch_bars(&self, request: &HistoryRequest) -> Result<Vec<Bar>, FetchError>;
}

/// Source of past trades.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeHistory: Send + Sync {
    /// Trades of `wallet` on a token/pool.
    async fn fetch_trades(
        &self,
        token: &str,
        pool: &str,
        wallet: &str,
    ) -> Result<Vec<TradeRecord>, FetchError>;
}

// =============================================================================
// Wallets
// =============================================================================

/// Wallets whose trades are marked on the chart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchedWallets {
    /// The user's wallet.
    pub wallet: Option<String>,
    /// The token's deployer.
    pub deployer: Option<String>,
}

impl WatchedWallets {
    /// Drop blank identifiers.
    #[must_use]
    pub fn normalized(self) -> Self {
        let keep = |id: Option<String>| id.filter(|s| !s.trim().is_empty());
        Self {
            wallet: keep(self.wallet),
            deployer: keep(self.deployer),
        }
    }
}

/// Externally owned wallet/deployer selection, polled by the feed.
pub trait WalletSource: Send + Sync {
    /// Current selection.
    fn current(&self) -> WatchedWallets;
}

// =============================================================================
// Consumer
// =============================================================================

/// Receives everything the feed produces.
pub trait BarConsumer: Send + Sync {
    /// A new or updated current bar.
    fn on_bar(&self, symbol: &str, bar: &Bar);

    /// Historical candles or the no-data signal.
    fn on_history(&self, symbol: &str, batch: &HistoryBatch);

    /// Trade markers. An empty slice clears previously delivered markers.
    fn on_marks(&self, symbol: &str, marks: &[TradeMark]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_is_no_data() {
        assert!(HistoryBatch::from_bars(Vec::new()).is_no_data());
        assert!(!HistoryBatch::from_bars(vec![Bar::flat(0, 1.0)]).is_no_data());
    }

    #[test]
    fn watched_wallets_drop_blank_ids() {
        let wallets = WatchedWallets {
            wallet: Some("  ".to_string()),
            deployer: Some("D".to_string()),
        }
        .normalized();
        assert_eq!(wallets.wallet, None);
        assert_eq!(wallets.deployer.as_deref(), Some("D"));
    }

    #[tokio::test]
    async fn listener_reports_closed_sender() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listener = RoomListener::new(3, Room::price("P"), rx);
        tx.send(Value::Bool(true)).unwrap();
        drop(tx);
        assert_eq!(listener.recv().await, Some(Value::Bool(true)));
        assert_eq!(listener.recv().await, None);
        assert_eq!(listener.id(), 3);
    }
}
