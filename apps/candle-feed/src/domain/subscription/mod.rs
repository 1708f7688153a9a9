//! Room Registry and De-duplication
//!
//! Session-scoped bookkeeping for the streaming session:
//! - which rooms are currently subscribed, grouped by channel
//! - which event identifiers have already been dispatched
//!
//! Both are owned by the session's event loop and mutated one event at a
//! time, so neither carries its own lock.

use std::collections::{BTreeSet, HashSet};

use serde_json::Value;

use crate::domain::room::{Channel, Room};

// =============================================================================
// Room Registry
// =============================================================================

/// The set of rooms the session should be joined to.
///
/// A room appears at most once; re-registering an existing room is reported
/// as a no-op so the caller never sends a second join for it.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    general: BTreeSet<Room>,
    transaction: BTreeSet<Room>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a room. Returns `true` if it was not registered before.
    pub fn insert(&mut self, room: Room) -> bool {
        self.rooms_mut(room.channel()).insert(room)
    }

    /// Remove a room. Returns `true` if it was registered.
    pub fn remove(&mut self, room: &Room) -> bool {
        self.rooms_mut(room.channel()).remove(room)
    }

    /// Check whether a room is registered.
    #[must_use]
    pub fn contains(&self, room: &Room) -> bool {
        self.rooms(room.channel()).contains(room)
    }

    /// Rooms bound to a channel, in a stable order.
    pub fn rooms_for(&self, channel: Channel) -> impl Iterator<Item = &Room> {
        self.rooms(channel).iter()
    }

    /// Total registered rooms across both channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.general.len() + self.transaction.len()
    }

    /// Whether no rooms are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.general.clear();
        self.transaction.clear();
    }

    /// Per-channel counts.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            general: self.general.len(),
            transaction: self.transaction.len(),
        }
    }

    const fn rooms(&self, channel: Channel) -> &BTreeSet<Room> {
        match channel {
            Channel::General => &self.general,
            Channel::Transaction => &self.transaction,
        }
    }

    const fn rooms_mut(&mut self, channel: Channel) -> &mut BTreeSet<Room> {
        match channel {
            Channel::General => &mut self.general,
            Channel::Transaction => &mut self.transaction,
        }
    }
}

/// Registered room counts per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Rooms on the general channel.
    pub general: usize,
    /// Rooms on the transaction channel.
    pub transaction: usize,
}

// =============================================================================
// De-duplication
// =============================================================================

/// Identifiers of events already dispatched during this session.
///
/// Unbounded for the life of the session; cleared only on full disconnect.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<String>,
}

impl DedupSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier. Returns `true` the first time it is seen.
    pub fn first_sighting(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        true
    }

    /// Number of identifiers recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Forget every identifier.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

/// Extract the de-duplication key of a payload.
///
/// Object payloads carrying a string or numeric `id` use it; otherwise a
/// transaction signature under `tx` is used. Payloads with neither are never
/// de-duplicated.
#[must_use]
pub fn event_id(data: &Value) -> Option<String> {
    let object = data.as_object()?;
    ["id", "tx"].iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn insert_reports_new_rooms_only() {
        let mut registry = RoomRegistry::new();
        assert!(registry.insert(Room::price("P")));
        assert!(!registry.insert(Room::price("P")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rooms_are_grouped_by_channel() {
        let mut registry = RoomRegistry::new();
        registry.insert(Room::price("P"));
        registry.insert(Room::transactions("T", "P"));
        registry.insert(Room::wallet_transactions("T", "P", "W"));

        let general: Vec<_> = registry.rooms_for(Channel::General).collect();
        let transaction: Vec<_> = registry.rooms_for(Channel::Transaction).collect();

        assert_eq!(general, vec![&Room::price("P")]);
        assert_eq!(transaction.len(), 2);
        assert_eq!(
            registry.stats(),
            RegistryStats {
                general: 1,
                transaction: 2
            }
        );
    }

    #[test]
    fn remove_and_clear() {
        let mut registry = RoomRegistry::new();
        registry.insert(Room::price("P"));
        registry.insert(Room::transactions("T", "P"));

        assert!(registry.remove(&Room::price("P")));
        assert!(!registry.remove(&Room::price("P")));
        assert!(!registry.contains(&Room::price("P")));
        assert!(registry.contains(&Room::transactions("T", "P")));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn dedup_reports_each_id_once() {
        let mut dedup = DedupSet::new();
        assert!(dedup.first_sighting("abc"));
        assert!(!dedup.first_sighting("abc"));
        assert!(dedup.first_sighting("def"));
        assert_eq!(dedup.len(), 2);

        dedup.clear();
        assert!(dedup.is_empty());
        assert!(dedup.first_sighting("abc"));
    }

    #[test]
    fn event_id_prefers_id_over_tx() {
        assert_eq!(
            event_id(&json!({"id": "a", "tx": "b"})),
            Some("a".to_string())
        );
        assert_eq!(event_id(&json!({"tx": "b"})), Some("b".to_string()));
        assert_eq!(event_id(&json!({"id": 42})), Some("42".to_string()));
    }

    #[test]
    fn event_id_absent_for_non_objects_and_blank_ids() {
        assert_eq!(event_id(&json!([{"tx": "b"}])), None);
        assert_eq!(event_id(&json!("tx")), None);
        assert_eq!(event_id(&json!({"id": ""})), None);
        assert_eq!(event_id(&json!({"price": 1.0})), None);
    }
}
