//! Domain Layer - Rooms, candles and aggregation rules.
//!
//! Everything here is synchronous and free of I/O. The streaming session and
//! the chart feed drive these types one event at a time.

/// Bar aggregation engine and volume bucket cache.
pub mod aggregation;

/// Candles, trades and trade markers.
pub mod market;

/// Resolution token resolver.
pub mod resolution;

/// Typed stream rooms and channel routing.
pub mod room;

/// Room registry and event de-duplication.
pub mod subscription;
