//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat relay.
//!
//! Every frame exchanged with a client is an envelope carrying an event
//! name and its payload:
//!
//! ```text
//! {"event": "enterRoom", "data": {"name": "Alice", "room": "general"}}
//! ```
//!
//! ## Events
//!
//! - `enterRoom` / `message` / `activity` - sent by clients
//! - `message` / `usersList` / `roomsList` / `activity` - sent by the server
//!
//! ## Encodings
//!
//! Text WebSocket frames carry JSON. Binary frames carry the same envelope
//! as MessagePack behind a 4-byte big-endian length prefix.
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ClientEvent};
//!
//! let event = ClientEvent::enter_room("Alice", "general");
//!
//! let text = codec::encode_json(&event).unwrap();
//! let decoded: ClientEvent = codec::decode_json(&text).unwrap();
//! assert_eq!(event, decoded);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, Encoding, ProtocolError, WireFrame};
pub use events::{ChatMessage, ClientEvent, EventKind, ServerEvent, User};
