//! Shared fixtures for Huddle benchmarks.

use huddle_core::{ConnectionId, Dispatcher, Hub};
use huddle_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A dispatcher with `rooms * per_room` connections already seated.
pub struct Populated {
    pub dispatcher: Dispatcher<Hub>,
    pub ids: Vec<ConnectionId>,
    pub inboxes: Vec<UnboundedReceiver<Arc<ServerEvent>>>,
}

impl Populated {
    /// Connect and seat members, round-robin across `rooms` rooms.
    #[must_use]
    pub fn new(rooms: usize, per_room: usize) -> Self {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let mut ids = Vec::new();
        let mut inboxes = Vec::new();

        for i in 0..rooms * per_room {
            let id = ConnectionId::new(format!("conn-{i}"));
            inboxes.push(dispatcher.transport_mut().connect(id.clone()));
            dispatcher.on_connect(&id);
            dispatcher.on_event(
                &id,
                ClientEvent::enter_room(format!("user-{i}"), format!("room-{}", i % rooms.max(1))),
            );
            ids.push(id);
        }

        let mut populated = Self {
            dispatcher,
            ids,
            inboxes,
        };
        populated.drain();
        populated
    }

    /// Discard everything queued for every connection. Returns the count.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        for inbox in &mut self.inboxes {
            while inbox.try_recv().is_ok() {
                count += 1;
            }
        }
        count
    }
}
