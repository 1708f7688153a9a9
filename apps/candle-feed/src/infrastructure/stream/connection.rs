//! Channel Link
//!
//! One WebSocket connection for one channel. A link reports its lifecycle to
//! the session queue (`ChannelOpened`, `MessageReceived`, `ConnectionLost`)
//! tagged with the generation it was opened under, and writes whatever the
//! session hands it. A handshake that stalls or a server that stops answering
//! pings is reported as lost. It never reconnects on its own: retry timing
//! belongs to the session.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::heartbeat::{HeartbeatConfig, HeartbeatState};
use super::session::{Frame, SessionEvent};
use crate::domain::room::Channel;

// =============================================================================
// Error Type
// =============================================================================

/// Transport failures. These drive reconnects and are never surfaced to
/// listeners.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed by the server or the stream ended.
    #[error("connection closed")]
    ConnectionClosed,

    /// The WebSocket handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// A ping went unanswered.
    #[error("heartbeat timeout after {0:?}")]
    HeartbeatTimeout(Duration),

    /// The session queue is gone.
    #[error("session stopped")]
    SessionGone,
}

// =============================================================================
// Channel Link
// =============================================================================

/// Handle to a running link task.
///
/// Dropping or closing the handle stops the task without reporting a loss.
#[derive(Debug)]
pub struct ChannelLink {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl ChannelLink {
    /// Spawn a link task that connects to `url`.
    #[must_use]
    pub fn spawn(
        url: String,
        channel: Channel,
        generation: u64,
        heartbeat: HeartbeatConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let task = LinkTask {
            url,
            channel,
            generation,
            heartbeat,
            events,
            outbound: outbound_rx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        Self {
            outbound: outbound_tx,
            cancel,
        }
    }

    /// Queue a text frame. Returns `false` if the task has ended.
    pub fn send(&self, text: String) -> bool {
        self.outbound.send(text).is_ok()
    }

    /// Stop the link.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ChannelLink {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct LinkTask {
    url: String,
    channel: Channel,
    generation: u64,
    heartbeat: HeartbeatConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl LinkTask {
    async fn run(mut self) {
        let result = self.connect_and_run().await;
        if let Err(e) = result
            && !self.cancel.is_cancelled()
        {
            let _ = self.events.send(SessionEvent::ConnectionLost {
                channel: self.channel,
                generation: self.generation,
                reason: e.to_string(),
            });
        }
    }

    /// Connect and pump frames until cancellation (`Ok`) or failure (`Err`).
    async fn connect_and_run(&mut self) -> Result<(), TransportError> {
        tracing::debug!(channel = %self.channel, url = %self.url, "opening link");

        let connect_timeout = self.heartbeat.connect_timeout;
        let handshake = tokio::time::timeout(
            connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        );
        let connected = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            connected = handshake => connected,
        };
        let (ws_stream, _response) =
            connected.map_err(|_| TransportError::HandshakeTimeout(connect_timeout))??;
        let (mut write, mut read) = ws_stream.split();

        self.emit(SessionEvent::ChannelOpened {
            channel: self.channel,
            generation: self.generation,
        })?;

        let ping_interval = self.heartbeat.ping_interval.max(Duration::from_millis(1));
        let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut liveness = HeartbeatState::new();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    let pong_timeout = self.heartbeat.pong_timeout;
                    if liveness.is_expired(pong_timeout) {
                        let silence_ms =
                            u64::try_from(liveness.silence().as_millis()).unwrap_or(u64::MAX);
                        tracing::warn!(channel = %self.channel, silence_ms, "heartbeat timeout");
                        return Err(TransportError::HeartbeatTimeout(pong_timeout));
                    }
                    liveness.mark_ping_sent();
                    write.send(Message::Ping(Vec::<u8>::new().into())).await?;
                }
                outgoing = self.outbound.recv() => {
                    let Some(text) = outgoing else {
                        return Ok(());
                    };
                    write.send(Message::Text(text.into())).await?;
                }
                msg = read.next() => {
                    if matches!(msg, Some(Ok(_))) {
                        liveness.record_activity();
                    }
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.emit(self.frame(Frame::Text(text.as_str().to_owned())))?;
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            self.emit(self.frame(Frame::Binary(bytes.to_vec())))?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!(channel = %self.channel, "server sent close frame");
                            return Err(TransportError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Pongs only feed the heartbeat
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(TransportError::ConnectionClosed),
                    }
                }
            }
        }
    }

    fn frame(&self, frame: Frame) -> SessionEvent {
        SessionEvent::MessageReceived {
            channel: self.channel,
            generation: self.generation,
            frame,
        }
    }

    fn emit(&self, event: SessionEvent) -> Result<(), TransportError> {
        self.events
            .send(event)
            .map_err(|_| TransportError::SessionGone)
    }
}
