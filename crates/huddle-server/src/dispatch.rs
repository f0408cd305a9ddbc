//! The dispatch loop.
//!
//! One task owns the dispatcher, its presence store, and the hub. Connection
//! tasks hand it commands over an unbounded channel, so events from every
//! connection are applied one at a time in arrival order.

use crate::metrics;
use huddle_core::{ConnectionId, Dispatcher, Hub, Outbox};
use huddle_protocol::ClientEvent;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A request for the dispatch loop.
#[derive(Debug)]
pub enum Command {
    /// A connection opened; its outbound events go to `outbox`.
    Connect { id: ConnectionId, outbox: Outbox },
    /// A connection sent an event.
    Event { id: ConnectionId, event: ClientEvent },
    /// A connection closed.
    Disconnect { id: ConnectionId },
}

/// Cloneable handle for submitting commands.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl DispatchHandle {
    /// Queue a command.
    ///
    /// Returns `false` if the dispatch loop has stopped.
    pub fn send(&self, command: Command) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Spawn the dispatch loop.
pub fn spawn(dispatcher: Dispatcher<Hub>) -> (DispatchHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(dispatcher, rx));
    (DispatchHandle { tx }, handle)
}

async fn run(mut dispatcher: Dispatcher<Hub>, mut rx: mpsc::UnboundedReceiver<Command>) {
    info!("Dispatch loop started");

    while let Some(command) = rx.recv().await {
        let start = Instant::now();

        match command {
            Command::Connect { id, outbox } => {
                dispatcher.transport_mut().register(id.clone(), outbox);
                dispatcher.on_connect(&id);
            }
            Command::Event { id, event } => {
                debug!(connection = %id, event = %event.kind(), "Dispatching");
                dispatcher.on_event(&id, event);
            }
            Command::Disconnect { id } => dispatcher.on_disconnect(&id),
        }

        metrics::record_dispatch(start.elapsed());
        metrics::set_room_stats(dispatcher.rooms().stats());
    }

    info!("Dispatch loop stopped");
}
