//! Presence tracking for Huddle.
//!
//! The presence store is the single source of truth for room membership:
//! one record per connection that has joined a room. Connections that have
//! not joined anything yet have no record at all.

use crate::connection::ConnectionId;
use huddle_protocol::User;
use std::collections::HashMap;
use tracing::debug;

/// A connection's current chat membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceRecord {
    /// Connection ID.
    pub id: ConnectionId,
    /// Display name, as supplied by the client.
    pub name: String,
    /// Room identifier, as supplied by the client.
    pub room: String,
}

impl PresenceRecord {
    /// Create a new presence record.
    #[must_use]
    pub fn new(id: ConnectionId, name: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            room: room.into(),
        }
    }
}

impl From<&PresenceRecord> for User {
    fn from(record: &PresenceRecord) -> Self {
        User {
            id: record.id.to_string(),
            name: record.name.clone(),
            room: record.room.clone(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    /// Insertion order; a re-join moves the record to the back.
    seq: u64,
    record: PresenceRecord,
}

/// Presence store keyed by connection.
#[derive(Debug, Default)]
pub struct PresenceStore {
    records: HashMap<ConnectionId, Slot>,
    next_seq: u64,
}

impl PresenceStore {
    /// Create an empty presence store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any record for `id` with a new one and return it.
    pub fn upsert(
        &mut self,
        id: &ConnectionId,
        name: impl Into<String>,
        room: impl Into<String>,
    ) -> PresenceRecord {
        let record = PresenceRecord::new(id.clone(), name, room);
        let seq = self.next_seq;
        self.next_seq += 1;

        let previous = self.records.insert(
            id.clone(),
            Slot {
                seq,
                record: record.clone(),
            },
        );

        debug!(
            connection = %id,
            room = %record.room,
            previous_room = previous.as_ref().map(|s| s.record.room.as_str()),
            "Presence: record stored"
        );

        record
    }

    /// Remove the record for `id`, if any.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<PresenceRecord> {
        let removed = self.records.remove(id).map(|slot| slot.record);
        if let Some(record) = &removed {
            debug!(connection = %id, room = %record.room, "Presence: record removed");
        }
        removed
    }

    /// Get the record for `id`.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<&PresenceRecord> {
        self.records.get(id).map(|slot| &slot.record)
    }

    /// Get the room `id` is currently in.
    #[must_use]
    pub fn room_of(&self, id: &ConnectionId) -> Option<&str> {
        self.get(id).map(|record| record.room.as_str())
    }

    /// All records, in the order they were stored.
    #[must_use]
    pub fn all(&self) -> Vec<&PresenceRecord> {
        let mut slots: Vec<&Slot> = self.records.values().collect();
        slots.sort_unstable_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| &slot.record).collect()
    }

    /// Number of connections currently in a room.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nobody is in any room.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
