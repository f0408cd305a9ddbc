//! # huddle-core
//!
//! Room membership and event fan-out for the Huddle chat relay.
//!
//! - **Presence** - Which connection is in which room, under which name
//! - **Router** - Room membership and active-room queries over presence
//! - **Transport** - The send/attach/detach boundary, and the in-memory `Hub`
//! - **Dispatcher** - Per-event protocol sequencing
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ ClientEvent │────▶│ Dispatcher  │────▶│  Transport  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │       │
//!                        ▼       ▼
//!               ┌──────────┐  ┌──────────┐
//!               │ Presence │◀─│  Router  │
//!               └──────────┘  └──────────┘
//! ```
//!
//! The dispatcher owns the presence store and is driven from a single task,
//! so none of these types lock.

pub mod connection;
pub mod dispatcher;
pub mod hub;
pub mod message;
pub mod presence;
pub mod router;
pub mod transport;

pub use connection::ConnectionId;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use hub::{Hub, Outbox};
pub use message::{ClockError, MessageClock};
pub use presence::{PresenceRecord, PresenceStore};
pub use router::{Recipients, RoomRouter, RouterStats};
pub use transport::Transport;
