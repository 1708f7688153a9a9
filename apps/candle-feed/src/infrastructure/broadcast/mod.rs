//! Room Listener Hub
//!
//! In-process fan-out of room events to any number of listeners.
//!
//! Each listener owns an unbounded queue, so it observes every event
//! published to its room in publish order regardless of how slowly it drains.
//! Listeners whose receiver was dropped are pruned on the next publish.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::application::ports::{ListenerId, RoomListener};
use crate::domain::room::Room;

/// Per-room listener registry.
#[derive(Debug, Default)]
pub struct ListenerHub {
    rooms: RwLock<HashMap<Room, Vec<(ListenerId, mpsc::UnboundedSender<Value>)>>>,
    next_id: AtomicU64,
}

/// Shared hub handle.
pub type SharedListenerHub = Arc<ListenerHub>;

/// Listener counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Rooms with at least one listener.
    pub rooms: usize,
    /// Listeners across all rooms.
    pub listeners: usize,
}

impl ListenerHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new listener to a room.
    pub fn on(&self, room: &Room) -> RoomListener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.rooms
            .write()
            .entry(room.clone())
            .or_default()
            .push((id, tx));

        RoomListener::new(id, room.clone(), rx)
    }

    /// Detach a listener. Returns `true` if it was attached.
    pub fn off(&self, room: &Room, id: ListenerId) -> bool {
        let mut rooms = self.rooms.write();
        let Some(listeners) = rooms.get_mut(room) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|(listener, _)| *listener != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            rooms.remove(room);
        }
        removed
    }

    /// Deliver an event to every listener of a room.
    ///
    /// Returns the number of listeners that received it.
    pub fn publish(&self, room: &Room, data: &Value) -> usize {
        let mut rooms = self.rooms.write();
        let Some(listeners) = rooms.get_mut(room) else {
            return 0;
        };
        listeners.retain(|(_, tx)| tx.send(data.clone()).is_ok());
        let delivered = listeners.len();
        if listeners.is_empty() {
            rooms.remove(room);
        }
        delivered
    }

    /// Number of listeners on a room.
    #[must_use]
    pub fn listener_count(&self, room: &Room) -> usize {
        self.rooms.read().get(room).map_or(0, Vec::len)
    }

    /// Listener counts.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        let rooms = self.rooms.read();
        HubStats {
            rooms: rooms.len(),
            listeners: rooms.values().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn every_listener_receives_in_order() {
        let hub = ListenerHub::new();
        let room = Room::price("P");
        let mut a = hub.on(&room);
        let mut b = hub.on(&room);

        assert_eq!(hub.publish(&room, &json!(1)), 2);
        assert_eq!(hub.publish(&room, &json!(2)), 2);

        assert_eq!(a.try_recv(), Some(json!(1)));
        assert_eq!(a.try_recv(), Some(json!(2)));
        assert_eq!(b.try_recv(), Some(json!(1)));
        assert_eq!(b.try_recv(), Some(json!(2)));
    }

    #[test]
    fn rooms_are_isolated() {
        let hub = ListenerHub::new();
        let mut price = hub.on(&Room::price("P"));
        assert_eq!(hub.publish(&Room::price("Q"), &json!(1)), 0);
        assert_eq!(price.try_recv(), None);
    }

    #[test]
    fn off_detaches_only_that_listener() {
        let hub = ListenerHub::new();
        let room = Room::price("P");
        let mut a = hub.on(&room);
        let b = hub.on(&room);

        assert!(hub.off(&room, b.id()));
        assert!(!hub.off(&room, b.id()));
        assert_eq!(hub.publish(&room, &json!("x")), 1);
        assert_eq!(a.try_recv(), Some(json!("x")));
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let hub = ListenerHub::new();
        let room = Room::price("P");
        let listener = hub.on(&room);
        drop(listener);

        assert_eq!(hub.publish(&room, &json!(1)), 0);
        assert_eq!(hub.stats(), HubStats::default());
    }

    #[tokio::test]
    async fn recv_ends_after_off() {
        let hub = ListenerHub::new();
        let room = Room::price("P");
        let mut listener = hub.on(&room);
        hub.off(&room, listener.id());
        assert_eq!(listener.recv().await, None);
    }
}
