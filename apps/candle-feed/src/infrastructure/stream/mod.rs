//! Data Stream Integration
//!
//! WebSocket session over the two stream channels:
//!
//! - `session`: room registry, de-duplication, dispatch and reconnect state
//! - `connection`: one WebSocket link per channel
//! - `heartbeat`: handshake timeout and ping liveness for a link
//! - `messages`/`codec`: the JSON envelope
//! - `reconnect`: backoff policy

pub mod codec;
pub mod connection;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod session;

pub use codec::{JsonCodec, ProtocolError};
pub use connection::{ChannelLink, TransportError};
pub use heartbeat::{HeartbeatConfig, HeartbeatState};
pub use messages::Envelope;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use session::{
    ChannelPhase, Effect, Frame, SessionConfig, SessionCore, SessionEvent, SessionStatus,
    StreamSession,
};
