//! Transport boundary for Huddle.
//!
//! The dispatcher never touches sockets. It attaches connections to named
//! groups and asks the transport to deliver events to a recipient set.
//! Sends are fire-and-forget: they never block and never fail, they only
//! report how many connections the event reached.

use crate::connection::ConnectionId;
use crate::router::Recipients;
use huddle_protocol::ServerEvent;
use std::sync::Arc;

/// A delivery layer with named connection groups.
pub trait Transport {
    /// Send an event to one connection.
    fn send_to(&self, connection: &ConnectionId, event: Arc<ServerEvent>) -> usize;

    /// Send an event to every connection in a group.
    fn send_to_room(&self, room: &str, event: Arc<ServerEvent>) -> usize;

    /// Send an event to every connection in a group except `except`.
    fn send_to_room_except(
        &self,
        except: &ConnectionId,
        room: &str,
        event: Arc<ServerEvent>,
    ) -> usize;

    /// Send an event to every open connection.
    fn broadcast_all(&self, event: Arc<ServerEvent>) -> usize;

    /// Attach a connection to a group.
    fn join(&mut self, connection: &ConnectionId, room: &str);

    /// Detach a connection from a group.
    fn leave(&mut self, connection: &ConnectionId, room: &str);

    /// Tear down a connection: detach it from every group and stop delivering to it.
    fn disconnect(&mut self, connection: &ConnectionId);

    /// Deliver an event to a recipient set.
    fn deliver(&self, to: &Recipients, event: Arc<ServerEvent>) -> usize {
        match to {
            Recipients::Connection(connection) => self.send_to(connection, event),
            Recipients::Room(room) => self.send_to_room(room, event),
            Recipients::RoomExcept { room, except } => {
                self.send_to_room_except(except, room, event)
            }
            Recipients::All => self.broadcast_all(event),
        }
    }
}
