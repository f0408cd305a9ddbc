//! In-memory transport.
//!
//! The hub keeps an outbox per open connection and the set of connections
//! attached to each named group. Events are shared behind an `Arc`, so a
//! room broadcast costs one allocation regardless of the member count.

use crate::connection::ConnectionId;
use crate::transport::Transport;
use huddle_protocol::ServerEvent;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Sending half of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Connection outboxes and room groups.
#[derive(Debug, Default)]
pub struct Hub {
    outboxes: HashMap<ConnectionId, Outbox>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbox.
    ///
    /// Re-registering an id replaces its outbox.
    pub fn register(&mut self, connection: ConnectionId, outbox: Outbox) {
        debug!(connection = %connection, "Hub: connection registered");
        self.outboxes.insert(connection, outbox);
    }

    /// Register a connection with a fresh outbox and return its receiving half.
    pub fn connect(
        &mut self,
        connection: ConnectionId,
    ) -> mpsc::UnboundedReceiver<Arc<ServerEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(connection, tx);
        rx
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.outboxes.contains_key(connection)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.outboxes.len()
    }

    /// Number of non-empty groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of connections attached to a group.
    #[must_use]
    pub fn group_size(&self, room: &str) -> usize {
        self.groups.get(room).map(HashSet::len).unwrap_or(0)
    }

    fn push(&self, connection: &ConnectionId, event: &Arc<ServerEvent>) -> bool {
        match self.outboxes.get(connection) {
            // A closed outbox belongs to a connection whose task is gone;
            // its disconnect is already queued.
            Some(outbox) => outbox.send(Arc::clone(event)).is_ok(),
            None => false,
        }
    }

    fn push_group(
        &self,
        room: &str,
        skip: Option<&ConnectionId>,
        event: &Arc<ServerEvent>,
    ) -> usize {
        let Some(members) = self.groups.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|member| Some(*member) != skip)
            .filter(|member| self.push(member, event))
            .count()
    }
}

impl Transport for Hub {
    fn send_to(&self, connection: &ConnectionId, event: Arc<ServerEvent>) -> usize {
        usize::from(self.push(connection, &event))
    }

    fn send_to_room(&self, room: &str, event: Arc<ServerEvent>) -> usize {
        let count = self.push_group(room, None, &event);
        trace!(room = %room, recipients = count, event = %event.kind(), "Room broadcast");
        count
    }

    fn send_to_room_except(
        &self,
        except: &ConnectionId,
        room: &str,
        event: Arc<ServerEvent>,
    ) -> usize {
        let count = self.push_group(room, Some(except), &event);
        trace!(room = %room, recipients = count, event = %event.kind(), "Room broadcast (excluding sender)");
        count
    }

    fn broadcast_all(&self, event: Arc<ServerEvent>) -> usize {
        let count = self
            .outboxes
            .keys()
            .filter(|connection| self.push(connection, &event))
            .count();
        trace!(recipients = count, event = %event.kind(), "Global broadcast");
        count
    }

    fn join(&mut self, connection: &ConnectionId, room: &str) {
        self.groups
            .entry(room.to_string())
            .or_default()
            .insert(connection.clone());
        debug!(connection = %connection, room = %room, "Hub: joined group");
    }

    fn leave(&mut self, connection: &ConnectionId, room: &str) {
        if let Some(members) = self.groups.get_mut(room) {
            members.remove(connection);
            if members.is_empty() {
                self.groups.remove(room);
                debug!(room = %room, "Hub: deleted empty group");
            }
        }
    }

    fn disconnect(&mut self, connection: &ConnectionId) {
        self.outboxes.remove(connection);
        self.groups.retain(|_, members| {
            members.remove(connection);
            !members.is_empty()
        });
        debug!(connection = %connection, "Hub: connection removed");
    }
}
