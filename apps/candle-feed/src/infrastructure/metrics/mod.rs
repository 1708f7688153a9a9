//! Prometheus Metrics Module
//!
//! Exposes feed metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Stream**: frames received, duplicates and malformed frames dropped,
//!   reconnects, connected channels, registered rooms
//! - **Bars**: bars emitted, volume batches applied
//! - **History**: historical fetch outcomes
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::room::Channel;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder once for the process.
///
/// With a non-zero `port`, metrics are served over HTTP on that port. With
/// port 0 the recorder is installed without a listener and the rendered text
/// is available through [`get_metrics_handle`]. Later calls are no-ops.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let builder = PrometheusBuilder::new();
    let handle = if port == 0 {
        Some(builder.install_recorder()?)
    } else {
        builder
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()?;
        None
    };

    let _ = PROMETHEUS_HANDLE.set(handle);
    register_metrics();
    tracing::info!(port, "metrics recorder installed");
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics are not initialized or are served over HTTP.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned().flatten()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "candle_feed_frames_received_total",
        "Frames received from the data stream"
    );
    describe_counter!(
        "candle_feed_duplicates_dropped_total",
        "Events dropped because their id was already seen"
    );
    describe_counter!(
        "candle_feed_malformed_frames_total",
        "Frames dropped because they could not be decoded"
    );
    describe_counter!(
        "candle_feed_reconnects_total",
        "Reconnects scheduled after a channel was lost"
    );
    describe_counter!(
        "candle_feed_room_requests_total",
        "Join and leave requests sent upstream"
    );
    describe_gauge!(
        "candle_feed_connected_channels",
        "Channels currently connected"
    );
    describe_gauge!(
        "candle_feed_registered_rooms",
        "Rooms currently registered with the session"
    );
    describe_counter!("candle_feed_bars_emitted_total", "Bars delivered to the consumer");
    describe_counter!(
        "candle_feed_volume_batches_total",
        "Transaction batches folded into volume buckets"
    );
    describe_counter!(
        "candle_feed_history_fetches_total",
        "Historical bar fetches by outcome"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for historical fetches.
#[derive(Debug, Clone, Copy)]
pub enum FetchOutcome {
    /// Bars returned.
    Bars,
    /// Nothing to return.
    NoData,
    /// Request failed.
    Error,
}

impl FetchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::NoData => "no_data",
            Self::Error => "error",
        }
    }
}

/// Record a frame received on a channel.
pub fn record_frame_received(channel: Channel) {
    counter!(
        "candle_feed_frames_received_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a duplicate event drop.
pub fn record_duplicate_dropped() {
    counter!("candle_feed_duplicates_dropped_total").increment(1);
}

/// Record a malformed frame drop.
pub fn record_malformed_frame(channel: Channel) {
    counter!(
        "candle_feed_malformed_frames_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect(channel: Channel) {
    counter!(
        "candle_feed_reconnects_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record a join or leave request sent upstream.
pub fn record_room_request(channel: Channel, kind: &'static str) {
    counter!(
        "candle_feed_room_requests_total",
        "channel" => channel.as_str(),
        "kind" => kind
    )
    .increment(1);
}

/// Update the connected channel count.
#[allow(clippy::cast_precision_loss)]
pub fn set_connected_channels(count: usize) {
    gauge!("candle_feed_connected_channels").set(count as f64);
}

/// Update the registered room count.
#[allow(clippy::cast_precision_loss)]
pub fn set_registered_rooms(count: usize) {
    gauge!("candle_feed_registered_rooms").set(count as f64);
}

/// Record a bar delivered to the consumer.
pub fn record_bar_emitted() {
    counter!("candle_feed_bars_emitted_total").increment(1);
}

/// Record a transaction batch folded into volume.
pub fn record_volume_batch() {
    counter!("candle_feed_volume_batches_total").increment(1);
}

/// Record a historical fetch outcome.
pub fn record_history_fetch(outcome: FetchOutcome) {
    counter!(
        "candle_feed_history_fetches_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

// =============================================================================
// Tests
// =============================================================================
