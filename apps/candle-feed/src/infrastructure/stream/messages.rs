//! Stream Message Types
//!
//! Every frame on either channel is a JSON envelope:
//!
//! ```json
//! {"type": "join", "room": "price:<pool>"}
//! {"type": "leave", "room": "price:<pool>"}
//! {"type": "message", "room": "price:<pool>", "data": {"price": 0.0012, "pool": "...", "token": "..."}}
//! ```
//!
//! Clients send `join`/`leave`; the server sends `message`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::room::Room;

/// A stream frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Subscribe to a room.
    Join {
        /// Target room.
        room: Room,
    },
    /// Unsubscribe from a room.
    Leave {
        /// Target room.
        room: Room,
    },
    /// A room event.
    Message {
        /// Source room.
        room: Room,
        /// Event payload.
        #[serde(default)]
        data: Value,
    },
    /// Any other frame type (acks, notices).
    #[serde(other)]
    Other,
}

impl Envelope {
    /// Join request for a room.
    #[must_use]
    pub const fn join(room: Room) -> Self {
        Self::Join { room }
    }

    /// Leave request for a room.
    #[must_use]
    pub const fn leave(room: Room) -> Self {
        Self::Leave { room }
    }
}
