//! Link Heartbeat
//!
//! Liveness tracking for one channel link. The link pings on an interval;
//! any frame from the server counts as proof of life. A ping left without
//! traffic for longer than the pong timeout marks the link dead so the
//! session can reconnect.

use std::time::Duration;

use tokio::time::Instant;

/// Handshake and heartbeat timing for channel links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Silence after a ping before the link is considered dead.
    pub pong_timeout: Duration,
    /// Limit on the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration with custom values.
    #[must_use]
    pub const fn new(
        ping_interval: Duration,
        pong_timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            ping_interval,
            pong_timeout,
            connect_timeout,
        }
    }
}

/// Per-connection liveness state. Created when the handshake completes.
#[derive(Debug)]
pub struct HeartbeatState {
    last_activity: Instant,
    waiting_for_pong: bool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Fresh state, counting the handshake as activity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_activity: Instant::now(),
            waiting_for_pong: false,
        }
    }

    /// Record any frame received from the server.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
        self.waiting_for_pong = false;
    }

    /// Record that a ping went out.
    pub const fn mark_ping_sent(&mut self) {
        self.waiting_for_pong = true;
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub const fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong
    }

    /// Time since the server was last heard from.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Whether an outstanding ping has gone unanswered past `timeout`.
    #[must_use]
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.waiting_for_pong && self.silence() > timeout
    }
}
