//! Logging Consumer
//!
//! [`BarConsumer`] that reports everything the feed produces through
//! `tracing`. Used by the binary when no chart front end is attached.

use crate::application::ports::{BarConsumer, HistoryBatch};
use crate::domain::market::{Bar, TradeMark};

/// Emits one structured event per bar, history batch or marker batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingBarConsumer;

impl TracingBarConsumer {
    /// Create a consumer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl BarConsumer for TracingBarConsumer {
    fn on_bar(&self, symbol: &str, bar: &Bar) {
        tracing::info!(
            symbol,
            time = bar.time,
            open = bar.open,
            high = bar.high,
            low = bar.low,
            close = bar.close,
            volume = bar.volume,
            "bar"
        );
    }

    fn on_history(&self, symbol: &str, batch: &HistoryBatch) {
        match batch {
            HistoryBatch::Bars(bars) => tracing::info!(
                symbol,
                count = bars.len(),
                first = bars.first().map(|b| b.time),
                last = bars.last().map(|b| b.time),
                "history"
            ),
            HistoryBatch::NoData => tracing::info!(symbol, "history: no data"),
        }
    }

    fn on_marks(&self, symbol: &str, marks: &[TradeMark]) {
        for mark in marks {
            tracing::info!(symbol, id = %mark.id, time = mark.time, label = %mark.label, "mark");
        }
        if marks.is_empty() {
            tracing::debug!(symbol, "marks cleared");
        }
    }
}
