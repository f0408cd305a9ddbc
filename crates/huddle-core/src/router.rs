//! Room queries over the presence store.
//!
//! Rooms are never stored. Every answer is recomputed from the presence
//! records at call time, so a room disappears the moment its last record
//! does and the room list cannot drift from membership.

use crate::connection::ConnectionId;
use crate::presence::{PresenceRecord, PresenceStore};
use huddle_protocol::User;
use std::collections::HashSet;

/// Who an outbound event goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// A single connection.
    Connection(ConnectionId),
    /// Every connection attached to a room.
    Room(String),
    /// Every connection attached to a room, except one.
    RoomExcept {
        /// Room name.
        room: String,
        /// Connection to skip.
        except: ConnectionId,
    },
    /// Every open connection, in a room or not.
    All,
}

/// Read-only room view over a presence store.
#[derive(Debug, Clone, Copy)]
pub struct RoomRouter<'a> {
    store: &'a PresenceStore,
}

impl<'a> RoomRouter<'a> {
    /// Create a router over the given store.
    #[must_use]
    pub fn new(store: &'a PresenceStore) -> Self {
        Self { store }
    }

    /// Records whose room equals `room` exactly.
    #[must_use]
    pub fn members_of(&self, room: &str) -> Vec<&'a PresenceRecord> {
        self.store
            .all()
            .into_iter()
            .filter(|record| record.room == room)
            .collect()
    }

    /// Member list of `room` in wire form.
    #[must_use]
    pub fn users_in(&self, room: &str) -> Vec<User> {
        self.members_of(room).into_iter().map(User::from).collect()
    }

    /// Distinct rooms with at least one member, by first occurrence.
    #[must_use]
    pub fn active_rooms(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.store
            .all()
            .into_iter()
            .filter(|record| seen.insert(record.room.as_str()))
            .map(|record| record.room.clone())
            .collect()
    }

    /// Get room statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            room_count: self.active_rooms().len(),
            member_count: self.store.len(),
        }
    }
}

/// Room statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    /// Number of rooms with at least one member.
    pub room_count: usize,
    /// Number of connections in a room.
    pub member_count: usize,
}
