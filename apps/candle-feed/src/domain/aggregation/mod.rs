//! Bar Aggregation Engine
//!
//! Folds historical candles and live price/volume ticks into one canonical
//! in-progress bar per symbol.
//!
//! # Rules
//!
//! - A tick whose price equals the last applied price for the symbol is a
//!   no-op. Seeding history clears the last applied price.
//! - A tick in the current bar's bucket updates it in place; a tick in a
//!   later bucket opens a new bar whose open is the previous close. The
//!   superseded bar moves to the symbol's history and is never touched again.
//! - Ticks in a bucket earlier than the current bar are dropped, so bar time
//!   only moves forward between reseeds.
//! - A zero price never overwrites an established open or close.
//! - Volume comes from the [`VolumeBucketCache`]. A bar whose bucket has no
//!   cache entry keeps the volume it already has.

pub mod volume;

use std::collections::{HashMap, VecDeque};

pub use volume::VolumeBucketCache;

use crate::domain::market::Bar;
use crate::domain::resolution::{self, ResolutionSpec};

/// Superseded bars retained per symbol by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5000;

// =============================================================================
// Per-symbol State
// =============================================================================

#[derive(Debug, Default)]
struct SymbolState {
    current: Option<Bar>,
    last_applied_price: Option<f64>,
    history: VecDeque<Bar>,
}

impl SymbolState {
    fn known_price(&self) -> Option<f64> {
        self.last_applied_price
            .filter(|p| *p != 0.0)
            .or_else(|| self.current.map(|bar| bar.close))
    }
}

/// Why a tick did not produce a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Same price as the last applied tick.
    UnchangedPrice,
    /// Price was negative, NaN or infinite.
    InvalidPrice,
    /// Zero price with no bar to attach it to.
    ZeroWithoutBar,
    /// Bucket precedes the current bar.
    StaleBucket,
    /// Volume recorded but no price is known yet.
    NoPrice,
}

// =============================================================================
// Engine
// =============================================================================

/// Current-bar state for every active symbol.
#[derive(Debug)]
pub struct BarEngine {
    symbols: HashMap<String, SymbolState>,
    volumes: VolumeBucketCache,
    history_capacity: usize,
}

impl Default for BarEngine {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl BarEngine {
    /// Create an engine retaining up to `history_capacity` superseded bars per
    /// symbol.
    #[must_use]
    pub fn new(history_capacity: usize) -> Self {
        Self {
            symbols: HashMap::new(),
            volumes: VolumeBucketCache::new(),
            history_capacity,
        }
    }

    /// Seed a symbol from an ascending historical sequence.
    ///
    /// The last bar becomes the current bar; the rest become history. Does not
    /// emit.
    pub fn seed_history(&mut self, symbol: &str, bars: &[Bar]) {
        let state = self.symbols.entry(symbol.to_string()).or_default();
        state.last_applied_price = None;
        state.history.clear();

        let Some((last, earlier)) = bars.split_last() else {
            state.current = None;
            return;
        };

        let skip = earlier.len().saturating_sub(self.history_capacity);
        state.history.extend(earlier.iter().skip(skip).copied());
        state.current = Some(*last);

        tracing::debug!(symbol, bars = bars.len(), time = last.time, "seeded history");
    }

    /// Apply a live price tick observed at `now` (unix seconds).
    ///
    /// # Errors
    ///
    /// Returns the [`Skip`] reason when the tick produces no bar.
    pub fn apply_tick(
        &mut self,
        symbol: &str,
        resolution_token: &str,
        price: f64,
        now: i64,
    ) -> Result<Bar, Skip> {
        if !price.is_finite() || price < 0.0 {
            return Err(Skip::InvalidPrice);
        }

        let state = self.symbols.entry(symbol.to_string()).or_default();
        if state.last_applied_price == Some(price) {
            return Err(Skip::UnchangedPrice);
        }
        if price == 0.0 && state.current.is_none() {
            return Err(Skip::ZeroWithoutBar);
        }

        let spec = resolution::resolve(resolution_token);
        let bar = self.fold(symbol, &spec, price, now)?;

        if let Some(state) = self.symbols.get_mut(symbol) {
            state.last_applied_price = Some(price);
        }
        Ok(bar)
    }

    /// Add a batch of trade volumes to the bucket containing `now`, then
    /// re-emit the current bar at the last known price.
    ///
    /// # Errors
    ///
    /// Returns [`Skip::NoPrice`] when the volume was recorded but no price is
    /// known for the symbol yet.
    pub fn apply_volume(
        &mut self,
        symbol: &str,
        resolution_token: &str,
        volumes: impl IntoIterator<Item = f64>,
        now: i64,
    ) -> Result<Bar, Skip> {
        let total: f64 = volumes.into_iter().filter(|v| v.is_finite()).sum();

        let spec = resolution::resolve(resolution_token);
        let bucket = spec.bucket_start(now);
        if self.volumes.add_volume(symbol, bucket, total) {
            let evicted = self
                .volumes
                .evict_older_than(symbol, now.saturating_sub(spec.width_i64()));
            if evicted > 0 {
                tracing::trace!(symbol, evicted, "evicted volume buckets");
            }
        }

        let price = self
            .symbols
            .get(symbol)
            .and_then(SymbolState::known_price)
            .ok_or(Skip::NoPrice)?;
        self.fold(symbol, &spec, price, now)
    }

    /// Steps shared by price and volume updates: bucket, read volume,
    /// update or open, store.
    fn fold(
        &mut self,
        symbol: &str,
        spec: &ResolutionSpec,
        price: f64,
        now: i64,
    ) -> Result<Bar, Skip> {
        let bucket = spec.bucket_start(now);
        let cached_volume = self.volumes.lookup(symbol, bucket);
        let capacity = self.history_capacity;
        let state = self.symbols.entry(symbol.to_string()).or_default();

        let bar = match state.current {
            Some(current) if bucket < current.time => return Err(Skip::StaleBucket),
            Some(mut current) if bucket == current.time => {
                if price != 0.0 {
                    current.high = current.high.max(price);
                    current.low = current.low.min(price);
                    current.close = price;
                }
                current.volume = cached_volume.unwrap_or(current.volume);
                current
            }
            previous => {
                let open = previous.map_or(price, |bar| bar.close);
                let close = if price == 0.0 { open } else { price };
                if let Some(superseded) = previous {
                    state.history.push_back(superseded);
                    while state.history.len() > capacity {
                        state.history.pop_front();
                    }
                }
                Bar {
                    time: bucket,
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                    volume: cached_volume.unwrap_or(0.0),
                }
            }
        };

        state.current = Some(bar);
        Ok(bar)
    }

    /// The in-progress bar of a symbol.
    #[must_use]
    pub fn current_bar(&self, symbol: &str) -> Option<Bar> {
        self.symbols.get(symbol)?.current
    }

    /// Last price applied by a tick, cleared by reseeding.
    #[must_use]
    pub fn last_applied_price(&self, symbol: &str) -> Option<f64> {
        self.symbols.get(symbol)?.last_applied_price
    }

    /// Superseded bars of a symbol, oldest first.
    #[must_use]
    pub fn history(&self, symbol: &str) -> Vec<Bar> {
        self.symbols
            .get(symbol)
            .map(|state| state.history.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Accumulated volume for a bucket of a symbol.
    #[must_use]
    pub fn bucket_volume(&self, symbol: &str, bucket_start: i64) -> f64 {
        self.volumes.get(symbol, bucket_start)
    }

    /// Drop all state of a symbol.
    pub fn release(&mut self, symbol: &str) {
        self.symbols.remove(symbol);
        self.volumes.clear_symbol(symbol);
    }

    /// Number of symbols with state.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = 3600;
    const T0: i64 = 1_700_002_800; // hour-aligned

    #[test]
    fn same_bucket_ticks_update_in_place() {
        let mut engine = BarEngine::default();
        engine.apply_tick("SOL", "60", 10.0, T0 + 5).unwrap();
        let bar = engine.apply_tick("SOL", "60", 12.0, T0 + 10).unwrap();

        assert_eq!(bar.time, T0);
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (10.0, 12.0, 10.0, 12.0));
    }

    #[test]
    fn next_bucket_opens_at_previous_close() {
        let mut engine = BarEngine::default();
        engine.apply_tick("SOL", "60", 10.0, T0).unwrap();
        engine.apply_tick("SOL", "60", 12.0, T0 + 1).unwrap();
        let bar = engine.apply_tick("SOL", "60", 8.0, T0 + HOUR + 1).unwrap();

        assert_eq!(bar.time, T0 + HOUR);
        assert_eq!((bar.open, bar.high, bar.low, bar.close), (12.0, 12.0, 8.0, 8.0));
        assert_eq!(engine.history("SOL").len(), 1);
        assert_eq!(engine.history("SOL")[0].close, 12.0);
    }

    #[test]
    fn repeated_price_is_noop() {
        let mut engine = BarEngine::default();
        let first = engine.apply_tick("SOL", "60", 10.0, T0).unwrap();
        assert_eq!(
            engine.apply_tick("SOL", "60", 10.0, T0 + 1),
            Err(Skip::UnchangedPrice)
        );
        assert_eq!(engine.current_bar("SOL"), Some(first));
    }

    #[test]
    fn zero_price_keeps_open_and_close() {
        let mut engine = BarEngine::default();
        engine.apply_tick("SOL", "60", 10.0, T0).unwrap();
        let same_bucket = engine.apply_tick("SOL", "60", 0.0, T0 + 1).unwrap();
        assert_eq!((same_bucket.close, same_bucket.low), (10.0, 10.0));

        engine.apply_tick("SOL", "60", 11.0, T0 + 2).unwrap();
        let next_bucket = engine.apply_tick("SOL", "60", 0.0, T0 + HOUR).unwrap();
        assert_eq!((next_bucket.open, next_bucket.close), (11.0, 11.0));
    }

    #[test]
    fn zero_price_without_bar_is_dropped() {
        let mut engine = BarEngine::default();
        assert_eq!(
            engine.apply_tick("SOL", "60", 0.0, T0),
            Err(Skip::ZeroWithoutBar)
        );
        assert!(engine.current_bar("SOL").is_none());
    }

    #[test]
    fn invalid_prices_are_rejected() {
        let mut engine = BarEngine::default();
        assert_eq!(
            engine.apply_tick("SOL", "60", f64::NAN, T0),
            Err(Skip::InvalidPrice)
        );
        assert_eq!(
            engine.apply_tick("SOL", "60", -1.0, T0),
            Err(Skip::InvalidPrice)
        );
    }

    #[test]
    fn stale_bucket_is_dropped() {
        let mut engine = BarEngine::default();
        engine.apply_tick("SOL", "60", 10.0, T0 + HOUR).unwrap();
        assert_eq!(
            engine.apply_tick("SOL", "60", 11.0, T0),
            Err(Skip::StaleBucket)
        );
        assert_eq!(engine.last_applied_price("SOL"), Some(10.0));
    }

    #[test]
    fn seed_sets_current_without_emitting_and_resets_dedup() {
        let mut engine = BarEngine::default();
        engine.apply_tick("SOL", "60", 10.0, T0).unwrap();

        let seeded = [Bar::flat(T0 - HOUR, 9.0), Bar::flat(T0, 10.0)];
        engine.seed_history("SOL", &seeded);

        assert_eq!(engine.current_bar("SOL"), Some(seeded[1]));
        assert_eq!(engine.history("SOL"), vec![seeded[0]]);
        assert_eq!(engine.last_applied_price("SOL"), None);
        assert!(engine.apply_tick("SOL", "60", 10.0, T0 + 1).is_ok());
    }

    #[test]
    fn seeded_volume_survives_until_bucket_has_volume() {
        let mut engine = BarEngine::default();
        let mut seeded = Bar::flat(T0, 10.0);
        seeded.volume = 42.0;
        engine.seed_history("SOL", &[seeded]);

        let bar = engine.apply_tick("SOL", "60", 11.0, T0 + 1).unwrap();
        assert_eq!(bar.volume, 42.0);

        let bar = engine.apply_volume("SOL", "60", [3.0], T0 + 2).unwrap();
        assert_eq!(bar.volume, 3.0);
    }

    #[test]
    fn volume_before_price_accumulates_then_lands_on_next_tick() {
        let mut engine = BarEngine::default();
        assert_eq!(
            engine.apply_volume("SOL", "60", [5.0], T0 + 1),
            Err(Skip::NoPrice)
        );
        assert_eq!(
            engine.apply_volume("SOL", "60", [3.0], T0 + 2),
            Err(Skip::NoPrice)
        );
        assert_eq!(engine.bucket_volume("SOL", T0), 8.0);

        let bar = engine.apply_tick("SOL", "60", 10.0, T0 + 3).unwrap();
        assert_eq!(bar.volume, 8.0);
    }

    #[test]
    fn volume_reemits_at_last_price() {
        let mut engine = BarEngine::default();
        engine.apply_tick("SOL", "60", 10.0, T0).unwrap();
        let bar = engine
            .apply_volume("SOL", "60", [1.5, 2.5], T0 + 10)
            .unwrap();
        assert_eq!(bar.close, 10.0);
        assert_eq!(bar.volume, 4.0);
    }

    #[test]
    fn new_bucket_evicts_buckets_outside_window() {
        let mut engine = BarEngine::default();
        engine.apply_volume("SOL", "60", [5.0], T0 + 10).ok();
        engine.apply_volume("SOL", "60", [1.0], T0 + HOUR + 10).ok();

        assert_eq!(engine.bucket_volume("SOL", T0), 0.0);
        assert_eq!(engine.bucket_volume("SOL", T0 + HOUR), 1.0);
    }

    #[test]
    fn history_is_capped() {
        let mut engine = BarEngine::new(2);
        for (i, price) in [1.0, 2.0, 3.0, 4.0].into_iter().enumerate() {
            let i = i64::try_from(i).unwrap();
            engine.apply_tick("SOL", "60", price, T0 + i * HOUR).unwrap();
        }
        let history = engine.history("SOL");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].close, 2.0);
        assert_eq!(history[1].close, 3.0);
    }

    #[test]
    fn release_drops_symbol_state() {
        let mut engine = BarEngine::default();
        engine.apply_tick("SOL", "60", 10.0, T0).unwrap();
        engine.apply_volume("SOL", "60", [1.0], T0).unwrap();
        engine.release("SOL");
        assert_eq!(engine.symbol_count(), 0);
        assert_eq!(engine.bucket_volume("SOL", T0), 0.0);
    }
}
