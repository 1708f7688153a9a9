//! Streaming Session Manager
//!
//! Owns the two channel connections, the room registry and the
//! de-duplication set, and republishes room events to in-process listeners.
//!
//! # Structure
//!
//! - [`SessionCore`]: synchronous state machine. Consumes one
//!   [`SessionEvent`] at a time and returns the [`Effect`]s to perform.
//! - [`StreamSession`]: cloneable handle. Requests become events on the
//!   session queue; a single driver task applies them in order.
//!
//! ```text
//!  handle ──► ┌─────────────┐      ┌──────────────┐ ──► general link
//!  links  ──► │ event queue │ ───► │ SessionCore  │ ──► transaction link
//!  timers ──► └─────────────┘      └──────────────┘ ──► ListenerHub
//! ```
//!
//! # Channel lifecycle
//!
//! `Disconnected → Connecting → Connected → Disconnected → Connecting ...`
//!
//! A lost channel schedules a reconnect after the backoff delay. Reaching
//! `Connected` resets the shared attempt counter and replays a join for every
//! registered room of that channel.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::connection::ChannelLink;
use super::heartbeat::HeartbeatConfig;
use super::messages::Envelope;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::room::{Channel, Room};
use crate::domain::subscription::{DedupSet, RoomRegistry, event_id};
use crate::application::ports::{ListenerId, RoomListener, RoomStream};
use crate::infrastructure::broadcast::{ListenerHub, SharedListenerHub};
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Session endpoints and backoff.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Endpoint for the general channel.
    pub general_url: String,
    /// Endpoint for the transaction channel.
    pub transaction_url: String,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Handshake timeout and link heartbeat.
    pub heartbeat: HeartbeatConfig,
}

impl SessionConfig {
    /// Both channels on one endpoint, default backoff.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            transaction_url: url.clone(),
            general_url: url,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Endpoint for a channel.
    #[must_use]
    pub fn url_for(&self, channel: Channel) -> &str {
        match channel {
            Channel::General => &self.general_url,
            Channel::Transaction => &self.transaction_url,
        }
    }
}

impl From<&StreamSettings> for SessionConfig {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            general_url: settings.general_url.clone(),
            transaction_url: settings.transaction_url.clone(),
            reconnect: settings.reconnect_config(),
            heartbeat: settings.heartbeat_config(),
        }
    }
}

// =============================================================================
// Events and Effects
// =============================================================================

/// A raw frame read from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

/// Everything the session reacts to, processed one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Open every disconnected channel.
    ConnectRequested,
    /// Close both channels and forget all rooms and seen ids.
    DisconnectRequested,
    /// A room was joined.
    Joined(Room),
    /// A room was left.
    Left(Room),
    /// A link finished its handshake.
    ChannelOpened {
        /// Channel of the link.
        channel: Channel,
        /// Link generation.
        generation: u64,
    },
    /// A link read a frame.
    MessageReceived {
        /// Channel of the link.
        channel: Channel,
        /// Link generation.
        generation: u64,
        /// The frame.
        frame: Frame,
    },
    /// A link failed or was closed by the server.
    ConnectionLost {
        /// Channel of the link.
        channel: Channel,
        /// Link generation.
        generation: u64,
        /// Failure description.
        reason: String,
    },
    /// A backoff timer fired.
    ReconnectDue {
        /// Session epoch the timer was scheduled in.
        epoch: u64,
    },
}

/// Work the driver performs on behalf of the core.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a new link for a channel.
    Open {
        /// Target channel.
        channel: Channel,
        /// Generation tag for the link's events.
        generation: u64,
    },
    /// Tear down a channel's link.
    Close {
        /// Target channel.
        channel: Channel,
    },
    /// Write a request on a channel.
    Send {
        /// Target channel.
        channel: Channel,
        /// Request to send.
        envelope: Envelope,
    },
    /// Deliver an event to a room's listeners.
    Dispatch {
        /// Target room.
        room: Room,
        /// Event payload.
        data: Value,
    },
    /// Queue a reconnect after a delay.
    ScheduleReconnect {
        /// Channel that was lost.
        channel: Channel,
        /// Backoff delay.
        delay: Duration,
        /// Current session epoch.
        epoch: u64,
    },
}

// =============================================================================
// Status
// =============================================================================

/// Connection state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelPhase {
    /// No link.
    #[default]
    Disconnected,
    /// Link handshake in progress.
    Connecting,
    /// Link open.
    Connected,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStatus {
    /// General channel state.
    pub general: ChannelPhase,
    /// Transaction channel state.
    pub transaction: ChannelPhase,
    /// Registered rooms.
    pub rooms: usize,
    /// Event ids recorded for de-duplication.
    pub seen_events: usize,
    /// Reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
}

impl SessionStatus {
    /// State of a channel.
    #[must_use]
    pub const fn phase(&self, channel: Channel) -> ChannelPhase {
        match channel {
            Channel::General => self.general,
            Channel::Transaction => self.transaction,
        }
    }

    /// Whether both channels are connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.general == ChannelPhase::Connected && self.transaction == ChannelPhase::Connected
    }

    fn connected_count(&self) -> usize {
        Channel::ALL
            .iter()
            .filter(|ch| self.phase(**ch) == ChannelPhase::Connected)
            .count()
    }
}

// =============================================================================
// Session Core
// =============================================================================

#[derive(Debug, Default, Clone, Copy)]
struct ChannelSlot {
    phase: ChannelPhase,
    generation: u64,
}

/// Synchronous session state machine.
#[derive(Debug)]
pub struct SessionCore {
    codec: JsonCodec,
    registry: RoomRegistry,
    dedup: DedupSet,
    general: ChannelSlot,
    transaction: ChannelSlot,
    reconnect: ReconnectPolicy,
    epoch: u64,
}

impl SessionCore {
    /// Create a core with both channels disconnected.
    #[must_use]
    pub fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            codec: JsonCodec::new(),
            registry: RoomRegistry::new(),
            dedup: DedupSet::new(),
            general: ChannelSlot::default(),
            transaction: ChannelSlot::default(),
            reconnect: ReconnectPolicy::new(reconnect),
            epoch: 0,
        }
    }

    /// Apply one event.
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        let mut effects = Vec::new();
        match event {
            SessionEvent::ConnectRequested => self.connect(&mut effects),
            SessionEvent::DisconnectRequested => self.disconnect(&mut effects),
            SessionEvent::Joined(room) => self.join(room, &mut effects),
            SessionEvent::Left(room) => self.leave(&room, &mut effects),
            SessionEvent::ChannelOpened {
                channel,
                generation,
            } => self.opened(channel, generation, &mut effects),
            SessionEvent::MessageReceived {
                channel,
                generation,
                frame,
            } => {
                if self.is_current(channel, generation) {
                    self.receive(channel, &frame, &mut effects);
                }
            }
            SessionEvent::ConnectionLost {
                channel,
                generation,
                reason,
            } => self.lost(channel, generation, &reason, &mut effects),
            SessionEvent::ReconnectDue { epoch } => {
                if epoch == self.epoch {
                    self.connect(&mut effects);
                }
            }
        }
        effects
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            general: self.general.phase,
            transaction: self.transaction.phase,
            rooms: self.registry.len(),
            seen_events: self.dedup.len(),
            reconnect_attempts: self.reconnect.attempt_count(),
        }
    }

    const fn slot(&self, channel: Channel) -> &ChannelSlot {
        match channel {
            Channel::General => &self.general,
            Channel::Transaction => &self.transaction,
        }
    }

    const fn slot_mut(&mut self, channel: Channel) -> &mut ChannelSlot {
        match channel {
            Channel::General => &mut self.general,
            Channel::Transaction => &mut self.transaction,
        }
    }

    fn is_current(&self, channel: Channel, generation: u64) -> bool {
        let slot = self.slot(channel);
        slot.generation == generation && slot.phase != ChannelPhase::Disconnected
    }

    fn is_connected(&self, channel: Channel) -> bool {
        self.slot(channel).phase == ChannelPhase::Connected
    }

    fn connect(&mut self, effects: &mut Vec<Effect>) {
        for channel in Channel::ALL {
            let slot = self.slot_mut(channel);
            if slot.phase != ChannelPhase::Disconnected {
                continue;
            }
            slot.phase = ChannelPhase::Connecting;
            slot.generation += 1;
            let generation = slot.generation;
            tracing::info!(%channel, generation, "connecting");
            effects.push(Effect::Open {
                channel,
                generation,
            });
        }
    }

    fn disconnect(&mut self, effects: &mut Vec<Effect>) {
        self.epoch += 1;
        for channel in Channel::ALL {
            let slot = self.slot_mut(channel);
            if slot.phase != ChannelPhase::Disconnected {
                effects.push(Effect::Close { channel });
            }
            slot.phase = ChannelPhase::Disconnected;
            slot.generation += 1;
        }
        self.registry.clear();
        self.dedup.clear();
        self.reconnect.reset();
        tracing::info!("session disconnected");
    }

    fn join(&mut self, room: Room, effects: &mut Vec<Effect>) {
        let channel = room.channel();
        if !self.registry.insert(room.clone()) {
            tracing::debug!(%room, "room already registered");
            return;
        }
        if self.is_connected(channel) {
            effects.push(Effect::Send {
                channel,
                envelope: Envelope::join(room),
            });
        } else {
            tracing::debug!(%room, %channel, "join deferred until channel connects");
        }
    }

    fn leave(&mut self, room: &Room, effects: &mut Vec<Effect>) {
        let channel = room.channel();
        if self.registry.remove(room) && self.is_connected(channel) {
            effects.push(Effect::Send {
                channel,
                envelope: Envelope::leave(room.clone()),
            });
        }
    }

    fn opened(&mut self, channel: Channel, generation: u64, effects: &mut Vec<Effect>) {
        let slot = self.slot_mut(channel);
        if slot.generation != generation || slot.phase != ChannelPhase::Connecting {
            tracing::debug!(%channel, generation, "ignoring stale link");
            return;
        }
        slot.phase = ChannelPhase::Connected;
        self.reconnect.reset();

        let rooms: Vec<Room> = self.registry.rooms_for(channel).cloned().collect();
        tracing::info!(%channel, rooms = rooms.len(), "connected, resubscribing");
        effects.extend(rooms.into_iter().map(|room| Effect::Send {
            channel,
            envelope: Envelope::join(room),
        }));
    }

    fn receive(&mut self, channel: Channel, frame: &Frame, effects: &mut Vec<Effect>) {
        metrics::record_frame_received(channel);

        let decoded = match frame {
            Frame::Text(text) => self.codec.decode(text),
            Frame::Binary(bytes) => self.codec.decode_binary(bytes),
        };
        let envelope = match decoded {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%channel, error = %e, "dropping malformed frame");
                metrics::record_malformed_frame(channel);
                return;
            }
        };

        let Envelope::Message { room, data } = envelope else {
            tracing::trace!(%channel, "ignoring non-message frame");
            return;
        };

        if let Some(id) = event_id(&data)
            && !self.dedup.first_sighting(&id)
        {
            tracing::trace!(%room, id = %id, "dropping duplicate event");
            metrics::record_duplicate_dropped();
            return;
        }

        let by_token = room
            .is_pool_price()
            .then(|| data.get("token").and_then(Value::as_str))
            .flatten()
            .filter(|token| !token.is_empty())
            .map(Room::price_by_token);

        if let Some(token_room) = by_token {
            effects.push(Effect::Dispatch {
                room: token_room,
                data: data.clone(),
            });
        }
        effects.push(Effect::Dispatch { room, data });
    }

    fn lost(&mut self, channel: Channel, generation: u64, reason: &str, effects: &mut Vec<Effect>) {
        if !self.is_current(channel, generation) {
            return;
        }
        self.slot_mut(channel).phase = ChannelPhase::Disconnected;

        let delay = self.reconnect.next_delay();
        tracing::warn!(
            %channel,
            reason,
            attempt = self.reconnect.attempt_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "channel lost, scheduling reconnect"
        );
        effects.push(Effect::Close { channel });
        effects.push(Effect::ScheduleReconnect {
            channel,
            delay,
            epoch: self.epoch,
        });
    }
}

// =============================================================================
// Session Handle
// =============================================================================

/// Handle to a running streaming session.
///
/// Cheap to clone; every clone drives the same session.
#[derive(Debug, Clone)]
pub struct StreamSession {
    events: mpsc::UnboundedSender<SessionEvent>,
    hub: SharedListenerHub,
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
}

impl StreamSession {
    /// Spawn the session driver on the current runtime.
    ///
    /// Channels stay disconnected until [`connect`](Self::connect).
    #[must_use]
    pub fn start(config: SessionConfig, cancel: CancellationToken) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let hub = SharedListenerHub::new(ListenerHub::new());

        let driver = SessionDriver {
            core: SessionCore::new(config.reconnect.clone()),
            config,
            codec: JsonCodec::new(),
            hub: SharedListenerHub::clone(&hub),
            links: HashMap::new(),
            events_tx: events_tx.clone(),
            events_rx,
            status_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(driver.run());

        Self {
            events: events_tx,
            hub,
            status: status_rx,
            cancel,
        }
    }

    /// Open both channels. No-op for channels already open or opening.
    pub fn connect(&self) {
        self.submit(SessionEvent::ConnectRequested);
    }

    /// Close both channels and clear the room registry and seen ids.
    pub fn disconnect(&self) {
        self.submit(SessionEvent::DisconnectRequested);
    }

    /// Register a room; the join is sent now or when its channel connects.
    pub fn join_room(&self, room: Room) {
        self.submit(SessionEvent::Joined(room));
    }

    /// Unregister a room; the leave is sent only if its channel is connected.
    pub fn leave_room(&self, room: Room) {
        self.submit(SessionEvent::Left(room));
    }

    /// Attach a listener to a room.
    #[must_use]
    pub fn on(&self, room: &Room) -> RoomListener {
        self.hub.on(room)
    }

    /// Detach a listener. Returns `true` if it was attached.
    pub fn off(&self, room: &Room, id: ListenerId) -> bool {
        self.hub.off(room, id)
    }

    /// Latest session status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Wait until the status satisfies `predicate`.
    ///
    /// Returns `None` if the session stopped first.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionStatus) -> bool,
    ) -> Option<SessionStatus> {
        let mut status = self.status.clone();
        status.wait_for(|s| predicate(s)).await.ok().map(|s| *s)
    }

    /// Stop the driver and every link.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    fn submit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("session stopped, request dropped");
        }
    }
}

impl RoomStream for StreamSession {
    fn connect(&self) {
        Self::connect(self);
    }

    fn join_room(&self, room: Room) {
        Self::join_room(self, room);
    }

    fn leave_room(&self, room: Room) {
        Self::leave_room(self, room);
    }

    fn on(&self, room: &Room) -> RoomListener {
        Self::on(self, room)
    }

    fn off(&self, room: &Room, id: ListenerId) -> bool {
        Self::off(self, room, id)
    }
}

// =============================================================================
// Driver
// =============================================================================

struct SessionDriver {
    core: SessionCore,
    config: SessionConfig,
    codec: JsonCodec,
    hub: SharedListenerHub,
    links: HashMap<Channel, ChannelLink>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
}

impl SessionDriver {
    async fn run(mut self) {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.events_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            for effect in self.core.handle(event) {
                self.apply(effect);
            }
            self.publish_status();
        }

        for (_, link) in self.links.drain() {
            link.close();
        }
        tracing::info!("session driver stopped");
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Open {
                channel,
                generation,
            } => {
                let link = ChannelLink::spawn(
                    self.config.url_for(channel).to_string(),
                    channel,
                    generation,
                    self.config.heartbeat,
                    self.events_tx.clone(),
                    self.cancel.child_token(),
                );
                if let Some(previous) = self.links.insert(channel, link) {
                    previous.close();
                }
            }
            Effect::Close { channel } => {
                if let Some(link) = self.links.remove(&channel) {
                    link.close();
                }
            }
            Effect::Send { channel, envelope } => self.send(channel, &envelope),
            Effect::Dispatch { room, data } => {
                let delivered = self.hub.publish(&room, &data);
                tracing::trace!(%room, delivered, "dispatched");
            }
            Effect::ScheduleReconnect {
                channel,
                delay,
                epoch,
            } => {
                metrics::record_reconnect(channel);
                let events = self.events_tx.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(delay) => {
                            let _ = events.send(SessionEvent::ReconnectDue { epoch });
                        }
                    }
                });
            }
        }
    }

    fn send(&self, channel: Channel, envelope: &Envelope) {
        let kind = match envelope {
            Envelope::Join { .. } => "join",
            Envelope::Leave { .. } => "leave",
            Envelope::Message { .. } | Envelope::Other => "other",
        };
        let text = match self.codec.encode(envelope) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(%channel, error = %e, "failed to encode request");
                return;
            }
        };
        match self.links.get(&channel) {
            Some(link) if link.send(text) => {
                metrics::record_room_request(channel, kind);
            }
            _ => tracing::debug!(%channel, kind, "link unavailable, request dropped"),
        }
    }

    fn publish_status(&self) {
        let status = self.core.status();
        metrics::set_connected_channels(status.connected_count());
        metrics::set_registered_rooms(status.rooms);
        self.status_tx.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn core() -> SessionCore {
        SessionCore::new(ReconnectConfig {
            jitter_factor: 0.0,
            ..ReconnectConfig::default()
        })
    }

    fn text(value: &Value) -> Frame {
        Frame::Text(value.to_string())
    }

    fn message(room: &str, data: Value) -> Frame {
        text(&json!({"type": "message", "room": room, "data": data}))
    }

    /// Connect both channels, returning every effect of the handshakes.
    fn connect_replay(core: &mut SessionCore) -> Vec<Effect> {
        core.handle(SessionEvent::ConnectRequested)
            .into_iter()
            .flat_map(|effect| match effect {
                Effect::Open {
                    channel,
                    generation,
                } => core.handle(SessionEvent::ChannelOpened {
                    channel,
                    generation,
                }),
                _ => Vec::new(),
            })
            .collect()
    }

    /// Connect both channels, returning their generations.
    fn connect_all(core: &mut SessionCore) -> (u64, u64) {
        connect_replay(core);
        (
            core.slot(Channel::General).generation,
            core.slot(Channel::Transaction).generation,
        )
    }

    fn sends(effects: &[Effect]) -> Vec<(Channel, Envelope)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Send { channel, envelope } => Some((*channel, envelope.clone())),
                _ => None,
            })
            .collect()
    }

    fn dispatched(effects: &[Effect]) -> Vec<Room> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Dispatch { room, .. } => Some(room.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connect_opens_both_channels_once() {
        let mut core = core();
        let effects = core.handle(SessionEvent::ConnectRequested);
        assert_eq!(effects.len(), 2);
        assert!(core.handle(SessionEvent::ConnectRequested).is_empty());
        assert_eq!(core.status().general, ChannelPhase::Connecting);
    }

    #[test]
    fn join_while_disconnected_is_deferred_then_replayed_once() {
        let mut core = core();
        assert!(core.handle(SessionEvent::Joined(Room::price("P"))).is_empty());
        assert!(
            core.handle(SessionEvent::Joined(Room::transactions("T", "P")))
                .is_empty()
        );
        assert!(core.handle(SessionEvent::Joined(Room::price("P"))).is_empty());

        let opened = connect_replay(&mut core);

        assert_eq!(
            sends(&opened),
            vec![
                (Channel::General, Envelope::join(Room::price("P"))),
                (
                    Channel::Transaction,
                    Envelope::join(Room::transactions("T", "P"))
                ),
            ]
        );
    }

    #[test]
    fn join_then_leave_while_disconnected_sends_nothing() {
        let mut core = core();
        assert!(core.handle(SessionEvent::Joined(Room::price("P"))).is_empty());
        assert!(core.handle(SessionEvent::Left(Room::price("P"))).is_empty());
        let replay = connect_replay(&mut core);
        assert!(sends(&replay).is_empty());
    }

    #[test]
    fn join_and_leave_when_connected_send_immediately() {
        let mut core = core();
        connect_all(&mut core);

        let joined = core.handle(SessionEvent::Joined(Room::wallet_transactions("T", "P", "W")));
        assert_eq!(
            sends(&joined),
            vec![(
                Channel::Transaction,
                Envelope::join(Room::wallet_transactions("T", "P", "W"))
            )]
        );

        let left = core.handle(SessionEvent::Left(Room::wallet_transactions("T", "P", "W")));
        assert_eq!(
            sends(&left),
            vec![(
                Channel::Transaction,
                Envelope::leave(Room::wallet_transactions("T", "P", "W"))
            )]
        );
    }

    #[test]
    fn duplicate_ids_are_dispatched_once() {
        let mut core = core();
        let (g, t) = connect_all(&mut core);

        let first = core.handle(SessionEvent::MessageReceived {
            channel: Channel::Transaction,
            generation: t,
            frame: message("transaction:T:P", json!({"tx": "sig", "volume": 1.0})),
        });
        let replayed_on_other_channel = core.handle(SessionEvent::MessageReceived {
            channel: Channel::General,
            generation: g,
            frame: message("transaction:T:P", json!({"tx": "sig", "volume": 1.0})),
        });

        assert_eq!(dispatched(&first), vec![Room::transactions("T", "P")]);
        assert!(replayed_on_other_channel.is_empty());
        assert_eq!(core.status().seen_events, 1);
    }

    #[test]
    fn payloads_without_ids_are_never_deduplicated() {
        let mut core = core();
        let (g, _) = connect_all(&mut core);
        for _ in 0..2 {
            let effects = core.handle(SessionEvent::MessageReceived {
                channel: Channel::General,
                generation: g,
                frame: message("latest", json!({"price": 1.0})),
            });
            assert_eq!(dispatched(&effects).len(), 1);
        }
    }

    #[test]
    fn pool_price_is_redispatched_by_token() {
        let mut core = core();
        let (g, _) = connect_all(&mut core);
        let effects = core.handle(SessionEvent::MessageReceived {
            channel: Channel::General,
            generation: g,
            frame: message("price:P", json!({"price": 1.0, "pool": "P", "token": "T"})),
        });
        assert_eq!(
            dispatched(&effects),
            vec![Room::price_by_token("T"), Room::price("P")]
        );
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let mut core = core();
        let (g, _) = connect_all(&mut core);
        for frame in [
            Frame::Text("{not json".to_string()),
            Frame::Binary(vec![0xff]),
            text(&json!({"type": "message", "room": ""})),
        ] {
            assert!(
                core.handle(SessionEvent::MessageReceived {
                    channel: Channel::General,
                    generation: g,
                    frame,
                })
                .is_empty()
            );
        }
        assert_eq!(core.status().general, ChannelPhase::Connected);
    }

    #[test]
    fn lost_channel_backs_off_and_resets_on_connect() {
        let mut core = core();
        let (g, _) = connect_all(&mut core);

        let effects = core.handle(SessionEvent::ConnectionLost {
            channel: Channel::General,
            generation: g,
            reason: "reset".to_string(),
        });
        assert!(effects.contains(&Effect::ScheduleReconnect {
            channel: Channel::General,
            delay: Duration::from_millis(2500),
            epoch: 0,
        }));
        assert_eq!(core.status().general, ChannelPhase::Disconnected);

        let reopened = core.handle(SessionEvent::ReconnectDue { epoch: 0 });
        assert_eq!(
            reopened,
            vec![Effect::Open {
                channel: Channel::General,
                generation: g + 1
            }]
        );

        let failed = core.handle(SessionEvent::ConnectionLost {
            channel: Channel::General,
            generation: g + 1,
            reason: "refused".to_string(),
        });
        assert!(failed.contains(&Effect::ScheduleReconnect {
            channel: Channel::General,
            delay: Duration::from_millis(4500),
            epoch: 0,
        }));
        assert_eq!(core.status().reconnect_attempts, 2);

        core.handle(SessionEvent::ReconnectDue { epoch: 0 });
        core.handle(SessionEvent::ChannelOpened {
            channel: Channel::General,
            generation: g + 2,
        });
        assert_eq!(core.status().reconnect_attempts, 0);
    }

    #[test]
    fn stale_generations_are_ignored() {
        let mut core = core();
        let (g, _) = connect_all(&mut core);
        core.handle(SessionEvent::ConnectionLost {
            channel: Channel::General,
            generation: g,
            reason: "reset".to_string(),
        });

        assert!(
            core.handle(SessionEvent::MessageReceived {
                channel: Channel::General,
                generation: g,
                frame: message("latest", json!({})),
            })
            .is_empty()
        );
        assert!(
            core.handle(SessionEvent::ConnectionLost {
                channel: Channel::General,
                generation: g,
                reason: "again".to_string(),
            })
            .is_empty()
        );
    }

    #[test]
    fn disconnect_clears_state_and_cancels_pending_reconnects() {
        let mut core = core();
        let (g, t) = connect_all(&mut core);
        core.handle(SessionEvent::Joined(Room::price("P")));
        core.handle(SessionEvent::MessageReceived {
            channel: Channel::Transaction,
            generation: t,
            frame: message("transaction:T:P", json!({"tx": "sig"})),
        });
        core.handle(SessionEvent::ConnectionLost {
            channel: Channel::General,
            generation: g,
            reason: "reset".to_string(),
        });

        let effects = core.handle(SessionEvent::DisconnectRequested);
        assert_eq!(
            effects,
            vec![Effect::Close {
                channel: Channel::Transaction
            }]
        );
        assert_eq!(core.status(), SessionStatus::default());
        assert!(core.handle(SessionEvent::ReconnectDue { epoch: 0 }).is_empty());

        // Fresh session after teardown: the old id is deliverable again.
        let (_, t) = connect_all(&mut core);
        let effects = core.handle(SessionEvent::MessageReceived {
            channel: Channel::Transaction,
            generation: t,
            frame: message("transaction:T:P", json!({"tx": "sig"})),
        });
        assert_eq!(dispatched(&effects).len(), 1);
    }
}
