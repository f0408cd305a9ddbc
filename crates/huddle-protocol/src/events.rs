//! Event types for the Huddle protocol.
//!
//! Events are adjacently tagged: the variant name travels in `event` and the
//! payload in `data`, which is what browser clients of the relay expect.

use serde::{Deserialize, Deserializer, Serialize};

/// Event name identifiers, shared by inbound and outbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EnterRoom,
    Message,
    Activity,
    UsersList,
    RoomsList,
}

impl EventKind {
    /// The event name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::EnterRoom => "enterRoom",
            EventKind::Message => "message",
            EventKind::Activity => "activity",
            EventKind::UsersList => "usersList",
            EventKind::RoomsList => "roomsList",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absent and `null` text fields both decode as the empty string.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// An event sent by a client.
///
/// Field contents are not validated here or anywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Join a room under a display name, leaving any current room.
    #[serde(rename = "enterRoom")]
    EnterRoom {
        /// Display name.
        #[serde(default, deserialize_with = "null_as_empty")]
        name: String,
        /// Room to join.
        #[serde(default, deserialize_with = "null_as_empty")]
        room: String,
    },

    /// Chat message for the sender's current room.
    #[serde(rename = "message")]
    Message {
        /// Author display name.
        #[serde(default, deserialize_with = "null_as_empty")]
        name: String,
        /// Message body.
        #[serde(default, deserialize_with = "null_as_empty")]
        text: String,
    },

    /// Typing indicator for the sender's current room.
    #[serde(rename = "activity")]
    Activity {
        /// Display name of the typing user.
        #[serde(default, deserialize_with = "null_as_empty")]
        name: String,
    },
}

impl ClientEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::EnterRoom { .. } => EventKind::EnterRoom,
            ClientEvent::Message { .. } => EventKind::Message,
            ClientEvent::Activity { .. } => EventKind::Activity,
        }
    }

    /// Create an `enterRoom` event.
    #[must_use]
    pub fn enter_room(name: impl Into<String>, room: impl Into<String>) -> Self {
        ClientEvent::EnterRoom {
            name: name.into(),
            room: room.into(),
        }
    }

    /// Create a `message` event.
    #[must_use]
    pub fn message(name: impl Into<String>, text: impl Into<String>) -> Self {
        ClientEvent::Message {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Create an `activity` event.
    #[must_use]
    pub fn activity(name: impl Into<String>) -> Self {
        ClientEvent::Activity { name: name.into() }
    }
}

/// A chat line as delivered to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author display name.
    pub name: String,
    /// Message body.
    pub text: String,
    /// Wall-clock time, formatted for display.
    pub time: String,
}

/// One entry of a room's member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Connection identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Room the user is in.
    pub room: String,
}

/// An event sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Chat message or system notice.
    #[serde(rename = "message")]
    Message(ChatMessage),

    /// Current members of a room.
    #[serde(rename = "usersList")]
    UsersList {
        /// Members in join order.
        users: Vec<User>,
    },

    /// Every room that currently has at least one member.
    #[serde(rename = "roomsList")]
    RoomsList {
        /// Room names.
        rooms: Vec<String>,
    },

    /// Someone in the room is typing. Carries their display name.
    #[serde(rename = "activity")]
    Activity(String),
}

impl ServerEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Message(_) => EventKind::Message,
            ServerEvent::UsersList { .. } => EventKind::UsersList,
            ServerEvent::RoomsList { .. } => EventKind::RoomsList,
            ServerEvent::Activity(_) => EventKind::Activity,
        }
    }

    /// Borrow the chat message, if this is a `message` event.
    #[must_use]
    pub fn as_message(&self) -> Option<&ChatMessage> {
        match self {
            ServerEvent::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enter_room_wire_shape() {
        let event = ClientEvent::enter_room("Alice", "general");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "enterRoom", "data": {"name": "Alice", "room": "general"}})
        );
    }

    #[test]
    fn test_missing_and_null_fields_become_empty() {
        let event: ClientEvent =
            serde_json::from_value(json!({"event": "enterRoom", "data": {"name": null}})).unwrap();
        assert_eq!(event, ClientEvent::enter_room("", ""));

        let event: ClientEvent =
            serde_json::from_value(json!({"event": "message", "data": {}})).unwrap();
        assert_eq!(event, ClientEvent::message("", ""));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let result: Result<ClientEvent, _> =
            serde_json::from_value(json!({"event": "shout", "data": {"name": "x"}}));
        assert!(result.is_err());
    }

    #[test]
    fn test_server_event_wire_shapes() {
        let activity = ServerEvent::Activity("Bob".into());
        assert_eq!(
            serde_json::to_value(&activity).unwrap(),
            json!({"event": "activity", "data": "Bob"})
        );

        let rooms = ServerEvent::RoomsList {
            rooms: vec!["general".into()],
        };
        assert_eq!(
            serde_json::to_value(&rooms).unwrap(),
            json!({"event": "roomsList", "data": {"rooms": ["general"]}})
        );

        let users = ServerEvent::UsersList {
            users: vec![User {
                id: "conn_1".into(),
                name: "Alice".into(),
                room: "general".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&users).unwrap(),
            json!({"event": "usersList", "data": {"users": [
                {"id": "conn_1", "name": "Alice", "room": "general"}
            ]}})
        );
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(ClientEvent::activity("a").kind().as_str(), "activity");
        assert_eq!(
            ServerEvent::RoomsList { rooms: vec![] }.kind().to_string(),
            "roomsList"
        );
    }
}
