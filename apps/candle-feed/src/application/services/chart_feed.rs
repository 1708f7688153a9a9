//! Chart Feed Service
//!
//! Drives one charted instrument: seeds the bar engine from history, folds
//! live price and transaction events into bars, and keeps trade markers for
//! the followed wallet and deployer up to date.
//!
//! Bar subscribers share one worker per feed. Room events are processed one
//! at a time by that worker, so the engine sees each event exactly once and in
//! arrival order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    BarConsumer, FetchError, HistoricalFetcher, HistoryBatch, HistoryRequest, ListenerId,
    RoomListener, RoomStream, TradeHistory, WalletSource, WatchedWallets,
};
use crate::domain::aggregation::{BarEngine, DEFAULT_HISTORY_CAPACITY, Skip};
use crate::domain::market::{
    Bar, MarkOwner, PriceUpdate, marks_for, trades_from_payload, volumes_from_payload,
};
use crate::domain::resolution::SUPPORTED_RESOLUTIONS;
use crate::domain::room::Room;
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// The instrument a feed charts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFeedConfig {
    /// Token identifier.
    pub token: String,
    /// Pool identifier.
    pub pool: String,
    /// Bar cache key and marker text symbol.
    pub symbol: String,
    /// Resolution token.
    pub resolution: String,
    /// Period of the wallet/deployer poll.
    pub wallet_poll_interval: Duration,
    /// Superseded bars retained by the engine.
    pub history_capacity: usize,
}

impl ChartFeedConfig {
    /// One-second bars for a token/pool, keyed by the token.
    #[must_use]
    pub fn new(token: impl Into<String>, pool: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            symbol: token.clone(),
            token,
            pool: pool.into(),
            resolution: "1S".to_string(),
            wallet_poll_interval: Duration::from_secs(1),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// Chart feed errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Historical candles could not be fetched.
    #[error("history fetch failed: {0}")]
    History(#[from] FetchError),
}

fn system_now() -> i64 {
    chrono::Utc::now().timestamp()
}

// =============================================================================
// Service
// =============================================================================

/// The running bar worker and the listeners it drains.
struct BarStream {
    cancel: CancellationToken,
    listeners: Vec<(Room, ListenerId)>,
}

#[derive(Default)]
struct BarSubscribers {
    uids: HashSet<String>,
    stream: Option<BarStream>,
}

/// Chart feed for one instrument.
pub struct ChartFeed<S, H, T, W, C>
where
    S: RoomStream,
    H: HistoricalFetcher,
    T: TradeHistory,
    W: WalletSource,
    C: BarConsumer,
{
    config: ChartFeedConfig,
    stream: Arc<S>,
    history: Arc<H>,
    trades: Arc<T>,
    wallets: Arc<W>,
    consumer: Arc<C>,
    engine: Arc<Mutex<BarEngine>>,
    subscriptions: Mutex<BarSubscribers>,
    marks: Mutex<Option<CancellationToken>>,
    clock: fn() -> i64,
    shutdown: CancellationToken,
}

impl<S, H, T, W, C> ChartFeed<S, H, T, W, C>
where
    S: RoomStream + 'static,
    H: HistoricalFetcher + 'static,
    T: TradeHistory + 'static,
    W: WalletSource + 'static,
    C: BarConsumer + 'static,
{
    /// Create a feed. Nothing is fetched or joined until requested.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ChartFeedConfig,
        stream: Arc<S>,
        history: Arc<H>,
        trades: Arc<T>,
        wallets: Arc<W>,
        consumer: Arc<C>,
        shutdown: CancellationToken,
    ) -> Self {
        let engine = BarEngine::new(config.history_capacity);
        Self {
            config,
            stream,
            history,
            trades,
            wallets,
            consumer,
            engine: Arc::new(Mutex::new(engine)),
            subscriptions: Mutex::new(BarSubscribers::default()),
            marks: Mutex::new(None),
            clock: system_now,
            shutdown,
        }
    }

    /// Replace the wall clock (unix seconds) used to bucket live events.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Instrument being charted.
    #[must_use]
    pub const fn config(&self) -> &ChartFeedConfig {
        &self.config
    }

    /// Resolution tokens this feed can serve.
    #[must_use]
    pub const fn supported_resolutions(&self) -> &'static [&'static str] {
        &SUPPORTED_RESOLUTIONS
    }

    /// Request for the configured instrument.
    #[must_use]
    pub fn history_request(&self, from: i64, to: i64, first_data_request: bool) -> HistoryRequest {
        HistoryRequest {
            token: self.config.token.clone(),
            pool: self.config.pool.clone(),
            resolution: self.config.resolution.clone(),
            from,
            to,
            first_data_request,
        }
    }

    /// Load history and deliver it to the consumer.
    ///
    /// Only the first request of a subscription fetches; later requests get
    /// [`HistoryBatch::NoData`]. Fetched candles seed the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch failed. The consumer has already been
    /// sent [`HistoryBatch::NoData`] in that case.
    pub async fn get_bars(&self, request: &HistoryRequest) -> Result<HistoryBatch, FeedError> {
        let symbol = self.config.symbol.as_str();

        if !request.first_data_request {
            let batch = HistoryBatch::NoData;
            self.consumer.on_history(symbol, &batch);
            return Ok(batch);
        }

        let mut bars = match self.history.fetch_bars(request).await {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "history fetch failed");
                self.consumer.on_history(symbol, &HistoryBatch::NoData);
                return Err(e.into());
            }
        };
        bars.sort_by_key(|bar| bar.time);

        if !bars.is_empty() {
            self.engine.lock().seed_history(symbol, &bars);
        }
        let batch = HistoryBatch::from_bars(bars);
        self.consumer.on_history(symbol, &batch);
        Ok(batch)
    }

    /// Start streaming bars for a subscriber.
    ///
    /// A subscriber that is already active is stopped first. The first
    /// subscriber joins the rooms and starts the worker; later ones share it.
    pub fn subscribe_bars(&self, uid: &str) {
        self.unsubscribe_bars(uid);

        let mut subscribers = self.subscriptions.lock();
        subscribers.uids.insert(uid.to_string());
        if subscribers.stream.is_none() {
            subscribers.stream = Some(self.start_bar_stream());
        }
        let count = subscribers.uids.len();
        drop(subscribers);

        tracing::info!(
            uid,
            symbol = %self.config.symbol,
            subscribers = count,
            "bar subscription started"
        );
    }

    /// Stop streaming bars for a subscriber.
    ///
    /// The worker stops and the rooms are left once no subscriber remains.
    /// Returns `false` if the subscriber was not active.
    pub fn unsubscribe_bars(&self, uid: &str) -> bool {
        let mut subscribers = self.subscriptions.lock();
        if !subscribers.uids.remove(uid) {
            return false;
        }
        let finished = if subscribers.uids.is_empty() {
            subscribers.stream.take()
        } else {
            None
        };
        drop(subscribers);

        if let Some(stream) = finished {
            stream.cancel.cancel();
            for (room, id) in stream.listeners {
                self.stream.off(&room, id);
                self.stream.leave_room(room);
            }
            tracing::debug!(symbol = %self.config.symbol, "bar stream stopped");
        }
        tracing::info!(uid, "bar subscription stopped");
        true
    }

    fn start_bar_stream(&self) -> BarStream {
        self.stream.connect();

        let price_room = Room::price(&self.config.pool);
        let transaction_room = Room::transactions(&self.config.token, &self.config.pool);
        let prices = self.stream.on(&price_room);
        let transactions = self.stream.on(&transaction_room);
        let listeners = vec![
            (price_room.clone(), prices.id()),
            (transaction_room.clone(), transactions.id()),
        ];
        self.stream.join_room(price_room);
        self.stream.join_room(transaction_room);

        let cancel = self.shutdown.child_token();
        let worker = BarWorker {
            symbol: self.config.symbol.clone(),
            resolution: self.config.resolution.clone(),
            engine: Arc::clone(&self.engine),
            consumer: Arc::clone(&self.consumer),
            clock: self.clock,
        };
        tokio::spawn(worker.run(prices, transactions, cancel.clone()));

        BarStream { cancel, listeners }
    }

    /// Number of active bar subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().uids.len()
    }

    /// The in-progress bar.
    #[must_use]
    pub fn current_bar(&self) -> Option<Bar> {
        self.engine.lock().current_bar(&self.config.symbol)
    }

    /// Start delivering trade markers.
    ///
    /// Sends an empty batch, fetches the followed wallet's and deployer's
    /// trades, then polls the wallet source. A change moves the live wallet
    /// rooms and refetches. Replaces any marker task already running.
    pub fn start_marks(&self) {
        let cancel = self.shutdown.child_token();
        if let Some(previous) = self.marks.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let watcher = MarkWatcher {
            token: self.config.token.clone(),
            pool: self.config.pool.clone(),
            symbol: self.config.symbol.clone(),
            poll_interval: self.config.wallet_poll_interval,
            stream: Arc::clone(&self.stream),
            trades: Arc::clone(&self.trades),
            wallets: Arc::clone(&self.wallets),
            consumer: Arc::clone(&self.consumer),
            watched: WatchedWallets::default(),
            wallet_listener: None,
            deployer_listener: None,
        };
        tokio::spawn(watcher.run(cancel));
    }

    /// Stop the marker task, leaving its rooms.
    pub fn stop_marks(&self) {
        if let Some(cancel) = self.marks.lock().take() {
            cancel.cancel();
        }
    }

    /// Stop every subscription and the marker task.
    pub fn shutdown(&self) {
        let uids: Vec<String> = self.subscriptions.lock().uids.iter().cloned().collect();
        for uid in uids {
            self.unsubscribe_bars(&uid);
        }
        self.stop_marks();
    }
}

impl<S, H, T, W, C> std::fmt::Debug for ChartFeed<S, H, T, W, C>
where
    S: RoomStream,
    H: HistoricalFetcher,
    T: TradeHistory,
    W: WalletSource,
    C: BarConsumer,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartFeed")
            .field("config", &self.config)
            .field("subscribers", &self.subscriptions.lock().uids.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Bar Worker
// =============================================================================

struct BarWorker<C> {
    symbol: String,
    resolution: String,
    engine: Arc<Mutex<BarEngine>>,
    consumer: Arc<C>,
    clock: fn() -> i64,
}

impl<C: BarConsumer> BarWorker<C> {
    async fn run(
        self,
        mut prices: RoomListener,
        mut transactions: RoomListener,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                Some(data) = prices.recv() => self.on_price(&data),
                Some(data) = transactions.recv() => self.on_transactions(&data),
                else => break,
            }
        }
        tracing::debug!(symbol = %self.symbol, "bar worker stopped");
    }

    fn on_price(&self, data: &Value) {
        let Some(update) = PriceUpdate::from_payload(data) else {
            return;
        };
        let now = (self.clock)();
        let result = self
            .engine
            .lock()
            .apply_tick(&self.symbol, &self.resolution, update.price, now);
        self.emit(result);
    }

    fn on_transactions(&self, data: &Value) {
        let volumes = volumes_from_payload(data);
        if volumes.is_empty() {
            return;
        }
        metrics::record_volume_batch();
        let now = (self.clock)();
        let result = self
            .engine
            .lock()
            .apply_volume(&self.symbol, &self.resolution, volumes, now);
        self.emit(result);
    }

    fn emit(&self, result: Result<Bar, Skip>) {
        match result {
            Ok(bar) => {
                metrics::record_bar_emitted();
                tracing::debug!(symbol = %self.symbol, time = bar.time, close = bar.close, "bar updated");
                self.consumer.on_bar(&self.symbol, &bar);
            }
            Err(skip) => tracing::trace!(symbol = %self.symbol, ?skip, "tick skipped"),
        }
    }
}

// =============================================================================
// Mark Watcher
// =============================================================================

struct MarkWatcher<S, T, W, C> {
    token: String,
    pool: String,
    symbol: String,
    poll_interval: Duration,
    stream: Arc<S>,
    trades: Arc<T>,
    wallets: Arc<W>,
    consumer: Arc<C>,
    watched: WatchedWallets,
    wallet_listener: Option<RoomListener>,
    deployer_listener: Option<RoomListener>,
}

impl<S, T, W, C> MarkWatcher<S, T, W, C>
where
    S: RoomStream,
    T: TradeHistory,
    W: WalletSource,
    C: BarConsumer,
{
    async fn run(mut self, cancel: CancellationToken) {
        self.consumer.on_marks(&self.symbol, &[]);
        self.follow(self.wallets.current());
        self.refetch().await;

        let mut poll = tokio::time::interval_at(
            Instant::now() + self.poll_interval,
            self.poll_interval.max(Duration::from_millis(1)),
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = poll.tick() => {
                    let current = self.wallets.current();
                    if current != self.watched {
                        tracing::info!(
                            wallet = ?current.wallet,
                            deployer = ?current.deployer,
                            "followed wallets changed"
                        );
                        self.follow(current);
                        self.refetch().await;
                    }
                }
                data = next_event(&mut self.wallet_listener) => {
                    self.on_live(&data, MarkOwner::Wallet);
                }
                data = next_event(&mut self.deployer_listener) => {
                    self.on_live(&data, MarkOwner::Deployer);
                }
            }
        }

        self.follow(WatchedWallets::default());
        tracing::debug!(symbol = %self.symbol, "mark watcher stopped");
    }

    /// Move the live rooms from the current selection to `next`.
    ///
    /// Wallet and deployer may name the same wallet, so rooms are diffed as
    /// sets while listeners are swapped per slot.
    fn follow(&mut self, next: WatchedWallets) {
        let before = self.rooms_for(&self.watched);
        let after = self.rooms_for(&next);

        if self.watched.wallet != next.wallet {
            let listener = self.wallet_listener.take();
            self.wallet_listener = self.relisten(listener, self.room_for(next.wallet.as_deref()));
        }
        if self.watched.deployer != next.deployer {
            let listener = self.deployer_listener.take();
            self.deployer_listener =
                self.relisten(listener, self.room_for(next.deployer.as_deref()));
        }

        for room in before.iter().filter(|room| !after.contains(room)) {
            self.stream.leave_room(room.clone());
        }
        for room in after.iter().filter(|room| !before.contains(room)) {
            self.stream.join_room(room.clone());
        }
        self.watched = next;
    }

    fn room_for(&self, wallet: Option<&str>) -> Option<Room> {
        wallet.map(|wallet| Room::wallet_transactions(&self.token, &self.pool, wallet))
    }

    fn rooms_for(&self, wallets: &WatchedWallets) -> Vec<Room> {
        [wallets.wallet.as_deref(), wallets.deployer.as_deref()]
            .into_iter()
            .filter_map(|wallet| self.room_for(wallet))
            .collect()
    }

    fn relisten(&self, previous: Option<RoomListener>, room: Option<Room>) -> Option<RoomListener> {
        if let Some(previous) = previous {
            self.stream.off(previous.room(), previous.id());
        }
        room.map(|room| self.stream.on(&room))
    }

    async fn refetch(&self) {
        self.consumer.on_marks(&self.symbol, &[]);

        let owners = [
            (self.watched.wallet.as_deref(), MarkOwner::Wallet),
            (self.watched.deployer.as_deref(), MarkOwner::Deployer),
        ];
        for (wallet, owner) in owners {
            let Some(wallet) = wallet else {
                continue;
            };
            match self.trades.fetch_trades(&self.token, &self.pool, wallet).await {
                Ok(trades) if !trades.is_empty() => {
                    let marks = marks_for(&trades, owner, &self.symbol);
                    self.consumer.on_marks(&self.symbol, &marks);
                }
                Ok(_) => tracing::debug!(wallet, ?owner, "no trades"),
                Err(e) => tracing::warn!(wallet, ?owner, error = %e, "trade fetch failed"),
            }
        }
    }

    fn on_live(&self, data: &Value, owner: MarkOwner) {
        let trades = trades_from_payload(data);
        if trades.is_empty() {
            return;
        }
        let marks = marks_for(&trades, owner, &self.symbol);
        self.consumer.on_marks(&self.symbol, &marks);
    }
}

/// Next event of an optional listener. Pends forever without one; a detached
/// listener is cleared.
async fn next_event(listener: &mut Option<RoomListener>) -> Value {
    loop {
        match listener {
            Some(active) => match active.recv().await {
                Some(data) => return data,
                None => *listener = None,
            },
            None => std::future::pending::<()>().await,
        }
    }
}
