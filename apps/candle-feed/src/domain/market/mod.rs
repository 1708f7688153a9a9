//! Market Data Types
//!
//! Candles, trades as published by the data stream and trade-history API,
//! and the chart markers derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Bar
// =============================================================================

/// One OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Bucket start, unix seconds.
    pub time: i64,
    /// Opening price.
    pub open: f64,
    /// Highest price.
    pub high: f64,
    /// Lowest price.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Traded volume within the bucket.
    #[serde(default)]
    pub volume: f64,
}

impl Bar {
    /// A bar with every price equal to `price` and no volume.
    #[must_use]
    pub const fn flat(time: i64, price: f64) -> Self {
        Self {
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// Whether the high/low envelope contains both open and close.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }
}

// =============================================================================
// Trades
// =============================================================================

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// Token bought.
    #[default]
    Buy,
    /// Token sold.
    Sell,
}

/// A single swap, as published on transaction rooms and by the trade-history
/// endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    /// Transaction signature.
    pub tx: String,
    /// Token amount.
    #[serde(default)]
    pub amount: f64,
    /// Execution price in USD.
    #[serde(default)]
    pub price_usd: f64,
    /// Notional USD volume.
    #[serde(default)]
    pub volume: f64,
    /// Trade direction.
    #[serde(rename = "type", default)]
    pub side: TradeSide,
    /// Trader wallet.
    #[serde(default)]
    pub wallet: String,
    /// Execution time, unix milliseconds.
    #[serde(default)]
    pub time: i64,
    /// Program that executed the swap.
    #[serde(default)]
    pub program: String,
    /// Token identifier.
    #[serde(default)]
    pub token: Option<String>,
}

/// Volume entry of a transaction batch. Only `volume` is read.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct VolumeEntry {
    /// Notional volume.
    #[serde(default)]
    pub volume: f64,
}

/// Price update published on `price:<pool>` rooms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PriceUpdate {
    /// Price in USD.
    pub price: f64,
    /// Pool the price was observed on.
    pub pool: String,
    /// Token identifier.
    #[serde(default)]
    pub token: Option<String>,
}

impl PriceUpdate {
    /// Read a price payload. Payloads without a `pool` are not price updates.
    #[must_use]
    pub fn from_payload(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

/// Volumes of a transaction payload: a single trade object or an array.
#[must_use]
pub fn volumes_from_payload(data: &Value) -> Vec<f64> {
    let entry = |v: &Value| serde_json::from_value::<VolumeEntry>(v.clone()).ok();
    match data {
        Value::Array(items) => items.iter().filter_map(entry).map(|e| e.volume).collect(),
        Value::Object(_) => entry(data).map(|e| e.volume).into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Trades of a wallet transaction payload: a single trade object or an
/// array. Entries without a `tx` are skipped.
#[must_use]
pub fn trades_from_payload(data: &Value) -> Vec<TradeRecord> {
    let trade = |v: &Value| serde_json::from_value::<TradeRecord>(v.clone()).ok();
    match data {
        Value::Array(items) => items.iter().filter_map(trade).collect(),
        Value::Object(_) => trade(data).into_iter().collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Trade Markers
// =============================================================================

/// Whose trades a marker annotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkOwner {
    /// The wallet the chart is following.
    Wallet,
    /// The token's deployer.
    Deployer,
}

/// Marker colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkColor {
    /// Sells.
    Red,
    /// Buys.
    Blue,
}

/// Smallest rendered marker size.
pub const MARK_MIN_SIZE: u32 = 25;

/// A chart annotation for one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeMark {
    /// Transaction signature.
    pub id: String,
    /// Trade time, unix seconds.
    pub time: i64,
    /// Marker colour.
    pub color: MarkColor,
    /// Tooltip lines.
    pub text: Vec<String>,
    /// Short label drawn on the marker.
    pub label: String,
    /// Label colour.
    pub label_font_color: String,
    /// Minimum marker size.
    pub min_size: u32,
}

impl TradeMark {
    /// Build the marker for a trade made by `owner`.
    #[must_use]
    pub fn from_trade(trade: &TradeRecord, owner: MarkOwner, symbol: &str) -> Self {
        let (label, verb) = match (owner, trade.side) {
            (MarkOwner::Wallet, TradeSide::Buy) => ("B", "Bought"),
            (MarkOwner::Wallet, TradeSide::Sell) => ("S", "Sold"),
            (MarkOwner::Deployer, TradeSide::Buy) => ("DB", "Dev bought"),
            (MarkOwner::Deployer, TradeSide::Sell) => ("DS", "Dev sold"),
        };
        let color = match trade.side {
            TradeSide::Sell => MarkColor::Red,
            TradeSide::Buy => MarkColor::Blue,
        };

        Self {
            id: trade.tx.clone(),
            time: trade.time.div_euclid(1000),
            color,
            text: vec![format!(
                "{verb} ${:.2} USD worth of {symbol}",
                trade.volume
            )],
            label: label.to_string(),
            label_font_color: "white".to_string(),
            min_size: MARK_MIN_SIZE,
        }
    }
}

/// Convert a batch of trades into markers.
#[must_use]
pub fn marks_for(trades: &[TradeRecord], owner: MarkOwner, symbol: &str) -> Vec<TradeMark> {
    trades
        .iter()
        .map(|trade| TradeMark::from_trade(trade, owner, symbol))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn trade(side: TradeSide, volume: f64) -> TradeRecord {
        TradeRecord {
            tx: "sig1".to_string(),
            amount: 1000.0,
            price_usd: 0.01,
            volume,
            side,
            wallet: "W".to_string(),
            time: 1_700_000_123_456,
            program: "raydium".to_string(),
            token: Some("T".to_string()),
        }
    }

    #[test]
    fn trade_record_reads_wire_fields() {
        let record: TradeRecord = serde_json::from_value(json!({
            "tx": "abc",
            "amount": 5.0,
            "priceUsd": 0.5,
            "volume": 2.5,
            "type": "sell",
            "wallet": "W",
            "time": 1_700_000_000_000_i64,
            "program": "pump",
        }))
        .unwrap();

        assert_eq!(record.side, TradeSide::Sell);
        assert_eq!(record.price_usd, 0.5);
        assert_eq!(record.token, None);
    }

    #[test]
    fn wallet_buy_marker() {
        let mark = TradeMark::from_trade(&trade(TradeSide::Buy, 12.5), MarkOwner::Wallet, "BONK");
        assert_eq!(mark.label, "B");
        assert_eq!(mark.color, MarkColor::Blue);
        assert_eq!(mark.text, vec!["Bought $12.50 USD worth of BONK".to_string()]);
        assert_eq!(mark.time, 1_700_000_123);
        assert_eq!(mark.min_size, MARK_MIN_SIZE);
    }

    #[test]
    fn deployer_sell_marker() {
        let mark = TradeMark::from_trade(&trade(TradeSide::Sell, 3.0), MarkOwner::Deployer, "BONK");
        assert_eq!(mark.label, "DS");
        assert_eq!(mark.color, MarkColor::Red);
        assert_eq!(mark.text, vec!["Dev sold $3.00 USD worth of BONK".to_string()]);
    }

    #[test]
    fn marker_serializes_camel_case() {
        let mark = TradeMark::from_trade(&trade(TradeSide::Buy, 1.0), MarkOwner::Wallet, "X");
        let value = serde_json::to_value(&mark).unwrap();
        assert_eq!(value["labelFontColor"], "white");
        assert_eq!(value["minSize"], 25);
        assert_eq!(value["color"], "blue");
    }

    #[test]
    fn bar_well_formed() {
        assert!(Bar::flat(0, 1.0).is_well_formed());
        let bad = Bar {
            time: 0,
            open: 2.0,
            high: 1.5,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
        };
        assert!(!bad.is_well_formed());
    }

    #[test]
    fn price_payload_requires_pool() {
        assert!(PriceUpdate::from_payload(&json!({"price": 1.5})).is_none());
        let update = PriceUpdate::from_payload(&json!({"price": 1.5, "pool": "P"})).unwrap();
        assert_eq!(update.token, None);
        assert_eq!(update.price, 1.5);
    }

    #[test]
    fn volumes_from_object_or_array() {
        assert_eq!(volumes_from_payload(&json!({"volume": 2.0})), vec![2.0]);
        assert_eq!(
            volumes_from_payload(&json!([{"volume": 1.0}, {"volume": 4.0}, "junk"])),
            vec![1.0, 4.0]
        );
        assert!(volumes_from_payload(&json!(3)).is_empty());
    }

    #[test]
    fn trades_without_tx_are_skipped() {
        let trades = trades_from_payload(&json!([
            {"tx": "a", "volume": 1.0, "type": "buy", "time": 1000},
            {"volume": 2.0}
        ]));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].tx, "a");
    }
}
