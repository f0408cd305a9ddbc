//! Per-connection protocol handling.
//!
//! The dispatcher applies each inbound event to the presence store and then
//! fans the consequences out through the transport. Within a join the order
//! is fixed: the old room hears about the departure, the store is updated,
//! the old room gets its refreshed member list, and only then does the
//! connection enter the new room. Refreshing the old room before the store
//! update would list the departing user one event too long.

use crate::connection::ConnectionId;
use crate::message::MessageClock;
use crate::presence::PresenceStore;
use crate::router::{Recipients, RoomRouter};
use crate::transport::Transport;
use huddle_protocol::{ChatMessage, ClientEvent, ServerEvent};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Author name for system notices.
    pub admin_name: String,
    /// Notice sent to every new connection.
    pub welcome: String,
    /// Time stamping for chat messages and notices.
    pub clock: MessageClock,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            admin_name: "Admin".to_string(),
            welcome: "Welcome to Chat App!".to_string(),
            clock: MessageClock::default(),
        }
    }
}

/// Drives presence and fan-out for every connection.
pub struct Dispatcher<T> {
    presence: PresenceStore,
    transport: T,
    config: DispatcherConfig,
}

impl<T: Transport> Dispatcher<T> {
    /// Create a dispatcher with default configuration.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DispatcherConfig::default())
    }

    /// Create a dispatcher with custom configuration.
    #[must_use]
    pub fn with_config(transport: T, config: DispatcherConfig) -> Self {
        Self {
            presence: PresenceStore::new(),
            transport,
            config,
        }
    }

    /// The presence store.
    #[must_use]
    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    /// Room queries over the current presence state.
    #[must_use]
    pub fn rooms(&self) -> RoomRouter<'_> {
        RoomRouter::new(&self.presence)
    }

    /// The transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport, for registering connections.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// A connection was opened.
    pub fn on_connect(&mut self, id: &ConnectionId) {
        info!(connection = %id, "User {} connected", id);
        let welcome = self.notice(self.config.welcome.clone());
        self.emit(Recipients::Connection(id.clone()), welcome);
    }

    /// Handle an inbound client event.
    pub fn on_event(&mut self, id: &ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::EnterRoom { name, room } => self.on_enter_room(id, name, room),
            ClientEvent::Message { name, text } => self.on_message(id, name, text),
            ClientEvent::Activity { name } => self.on_activity(id, name),
        }
    }

    /// Move a connection into `room` under `name`.
    ///
    /// Joining the room the connection is already in runs the full
    /// leave/join sequence again.
    pub fn on_enter_room(&mut self, id: &ConnectionId, name: String, room: String) {
        if let Some(seated) = self.presence.room_of(id).map(str::to_string) {
            self.transport.leave(id, &seated);
        }
        let prev_room = self.current_room(id);

        if let Some(prev) = &prev_room {
            let left = self.notice(format!("{name} has left the room"));
            self.emit(Recipients::Room(prev.clone()), left);
        }

        let record = self.presence.upsert(id, name, room);

        if let Some(prev) = &prev_room {
            let users = self.users_list(prev);
            self.emit(Recipients::Room(prev.clone()), users);
        }

        self.transport.join(id, &record.room);
        debug!(
            connection = %id,
            room = %record.room,
            previous_room = prev_room.as_deref(),
            "Entered room"
        );

        let joined = self.notice(format!("You have joined the {} chat room", record.room));
        self.emit(Recipients::Connection(id.clone()), joined);

        let announced = self.notice(format!("{} has joined the room", record.name));
        self.emit(
            Recipients::RoomExcept {
                room: record.room.clone(),
                except: id.clone(),
            },
            announced,
        );

        let users = self.users_list(&record.room);
        self.emit(Recipients::Room(record.room.clone()), users);

        let rooms = self.rooms_list();
        self.emit(Recipients::All, rooms);
    }

    /// Relay a chat message to the sender's room, sender included.
    pub fn on_message(&mut self, id: &ConnectionId, name: String, text: String) {
        let Some(room) = self.current_room(id) else {
            trace!(connection = %id, "Message outside of a room dropped");
            return;
        };

        let message = ServerEvent::Message(self.config.clock.stamp(name, text));
        self.emit(Recipients::Room(room), message);
    }

    /// Relay a typing notice to everyone else in the sender's room.
    pub fn on_activity(&mut self, id: &ConnectionId, name: String) {
        let Some(room) = self.current_room(id) else {
            trace!(connection = %id, "Activity outside of a room dropped");
            return;
        };

        self.emit(
            Recipients::RoomExcept {
                room,
                except: id.clone(),
            },
            ServerEvent::Activity(name),
        );
    }

    /// A connection closed, with or without leaving its room first.
    pub fn on_disconnect(&mut self, id: &ConnectionId) {
        self.transport.disconnect(id);

        if let Some(record) = self.presence.remove(id) {
            let left = self.notice(format!("{} has left the room", record.name));
            self.emit(Recipients::Room(record.room.clone()), left);

            let users = self.users_list(&record.room);
            self.emit(Recipients::Room(record.room), users);

            let rooms = self.rooms_list();
            self.emit(Recipients::All, rooms);
        }

        info!(connection = %id, "User {} disconnected", id);
    }

    /// The room a connection is seated in. The empty room name counts as
    /// no room for relaying and leave notices.
    fn current_room(&self, id: &ConnectionId) -> Option<String> {
        self.presence
            .room_of(id)
            .filter(|room| !room.is_empty())
            .map(str::to_string)
    }

    fn notice(&self, text: String) -> ServerEvent {
        ServerEvent::Message(ChatMessage {
            name: self.config.admin_name.clone(),
            text,
            time: self.config.clock.now(),
        })
    }

    fn users_list(&self, room: &str) -> ServerEvent {
        ServerEvent::UsersList {
            users: self.rooms().users_in(room),
        }
    }

    fn rooms_list(&self) -> ServerEvent {
        ServerEvent::RoomsList {
            rooms: self.rooms().active_rooms(),
        }
    }

    fn emit(&self, to: Recipients, event: ServerEvent) -> usize {
        let kind = event.kind();
        let count = self.transport.deliver(&to, Arc::new(event));
        trace!(recipients = count, event = %kind, to = ?to, "Emitted");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Hub;
    use huddle_protocol::User;
    use std::collections::HashSet;
    use tokio::sync::mpsc::UnboundedReceiver;

    type Inbox = UnboundedReceiver<Arc<ServerEvent>>;

    fn connect(dispatcher: &mut Dispatcher<Hub>, id: &str) -> (ConnectionId, Inbox) {
        let id = ConnectionId::from(id);
        let rx = dispatcher.transport_mut().connect(id.clone());
        dispatcher.on_connect(&id);
        (id, rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((*event).clone());
        }
        events
    }

    fn text_of(event: &ServerEvent) -> Option<&str> {
        event.as_message().map(|msg| msg.text.as_str())
    }

    fn notices(events: &[ServerEvent]) -> Vec<&str> {
        events.iter().filter_map(text_of).collect()
    }

    fn user_names(event: &ServerEvent) -> Vec<&str> {
        match event {
            ServerEvent::UsersList { users } => users.iter().map(|u| u.name.as_str()).collect(),
            other => panic!("Expected usersList, got {:?}", other),
        }
    }

    fn rooms(event: &ServerEvent) -> Vec<&str> {
        match event {
            ServerEvent::RoomsList { rooms } => rooms.iter().map(String::as_str).collect(),
            other => panic!("Expected roomsList, got {:?}", other),
        }
    }

    #[test]
    fn test_connect_sends_welcome_only_to_new_connection() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (_, mut a) = connect(&mut dispatcher, "a");
        let (_, mut b) = connect(&mut dispatcher, "b");

        let a_events = drain(&mut a);
        assert_eq!(notices(&a_events), vec!["Welcome to Chat App!"]);
        assert_eq!(a_events[0].as_message().unwrap().name, "Admin");
        assert_eq!(drain(&mut b).len(), 1);
    }

    #[test]
    fn test_first_join() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        drain(&mut a);

        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));

        let events = drain(&mut a);
        assert_eq!(events.len(), 3);
        assert_eq!(
            text_of(&events[0]),
            Some("You have joined the general chat room")
        );
        assert_eq!(
            events[1],
            ServerEvent::UsersList {
                users: vec![User {
                    id: "a".into(),
                    name: "Alice".into(),
                    room: "general".into(),
                }]
            }
        );
        assert_eq!(rooms(&events[2]), vec!["general"]);
        assert_eq!(dispatcher.rooms().active_rooms(), vec!["general"]);
    }

    #[test]
    fn test_second_member_join_and_message() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));

        let a_events = drain(&mut a);
        assert_eq!(a_events.len(), 3);
        assert_eq!(text_of(&a_events[0]), Some("Bob has joined the room"));
        assert_eq!(user_names(&a_events[1]), vec!["Alice", "Bob"]);
        assert_eq!(rooms(&a_events[2]), vec!["general"]);

        let b_events = drain(&mut b);
        assert_eq!(b_events.len(), 3);
        assert_eq!(
            text_of(&b_events[0]),
            Some("You have joined the general chat room")
        );
        assert_eq!(user_names(&b_events[1]), vec!["Alice", "Bob"]);

        dispatcher.on_event(&b_id, ClientEvent::message("Bob", "hi"));
        for inbox in [&mut a, &mut b] {
            let events = drain(inbox);
            assert_eq!(events.len(), 1);
            let msg = events[0].as_message().unwrap();
            assert_eq!(msg.name, "Bob");
            assert_eq!(msg.text, "hi");
            assert!(!msg.time.is_empty());
        }
    }

    #[test]
    fn test_switching_rooms_refreshes_old_room_after_update() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "random"));

        let a_events = drain(&mut a);
        assert_eq!(a_events.len(), 3);
        assert_eq!(text_of(&a_events[0]), Some("Bob has left the room"));
        assert_eq!(user_names(&a_events[1]), vec!["Alice"]);
        assert_eq!(rooms(&a_events[2]), vec!["general", "random"]);

        let b_events = drain(&mut b);
        assert_eq!(notices(&b_events), vec!["You have joined the random chat room"]);
        assert_eq!(user_names(&b_events[1]), vec!["Bob"]);
        assert_eq!(rooms(&b_events[2]), vec!["general", "random"]);

        let router = dispatcher.rooms();
        assert_eq!(router.members_of("general").len(), 1);
        assert_eq!(router.members_of("random").len(), 1);
    }

    #[test]
    fn test_disconnect_last_member_removes_room() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "random"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_disconnect(&a_id);

        assert_eq!(dispatcher.rooms().active_rooms(), vec!["random"]);
        assert!(drain(&mut a).is_empty());
        let b_events = drain(&mut b);
        assert_eq!(b_events.len(), 1);
        assert_eq!(rooms(&b_events[0]), vec!["random"]);

        dispatcher.on_disconnect(&b_id);
        assert!(dispatcher.rooms().active_rooms().is_empty());
    }

    #[test]
    fn test_disconnect_notifies_remaining_members() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_disconnect(&b_id);

        let a_events = drain(&mut a);
        assert_eq!(a_events.len(), 3);
        assert_eq!(text_of(&a_events[0]), Some("Bob has left the room"));
        assert_eq!(user_names(&a_events[1]), vec!["Alice"]);
        assert_eq!(rooms(&a_events[2]), vec!["general"]);
        assert!(dispatcher.presence().get(&b_id).is_none());
    }

    #[test]
    fn test_disconnect_without_join_is_silent() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_disconnect(&b_id);

        assert!(drain(&mut a).is_empty());
        assert!(!dispatcher.transport().is_connected(&b_id));
    }

    #[test]
    fn test_events_without_room_are_dropped() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_event(&a_id, ClientEvent::message("Alice", "anyone?"));
        dispatcher.on_event(&a_id, ClientEvent::activity("Alice"));

        assert!(drain(&mut a).is_empty());
        assert!(drain(&mut b).is_empty());
    }

    #[test]
    fn test_empty_room_name_is_no_room() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", ""));
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", ""));
        drain(&mut a);
        drain(&mut b);

        assert_eq!(dispatcher.rooms().members_of("").len(), 2);
        assert_eq!(dispatcher.rooms().active_rooms(), vec![String::new()]);

        dispatcher.on_event(&b_id, ClientEvent::message("Bob", "hello?"));
        dispatcher.on_event(&b_id, ClientEvent::activity("Bob"));
        assert!(drain(&mut a).is_empty());
        assert!(drain(&mut b).is_empty());

        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "x"));

        let a_events = drain(&mut a);
        assert_eq!(a_events.len(), 1);
        assert_eq!(rooms(&a_events[0]), vec!["", "x"]);

        let b_events = drain(&mut b);
        assert_eq!(notices(&b_events), vec!["You have joined the x chat room"]);
        assert_eq!(dispatcher.transport().group_size(""), 1);
        assert_eq!(dispatcher.transport().group_size("x"), 1);
    }

    #[test]
    fn test_activity_excludes_sender() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        let (c_id, mut c) = connect(&mut dispatcher, "c");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));
        dispatcher.on_event(&c_id, ClientEvent::enter_room("Carol", "random"));
        drain(&mut a);
        drain(&mut b);
        drain(&mut c);

        dispatcher.on_event(&a_id, ClientEvent::activity("Alice"));

        assert!(drain(&mut a).is_empty());
        assert_eq!(drain(&mut b), vec![ServerEvent::Activity("Alice".into())]);
        assert!(drain(&mut c).is_empty());
    }

    #[test]
    fn test_redundant_join_repeats_side_effects() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));

        let a_events = drain(&mut a);
        assert_eq!(
            notices(&a_events),
            vec!["Bob has left the room", "Bob has joined the room"]
        );
        assert_eq!(user_names(&a_events[1]), vec!["Alice", "Bob"]);
        assert_eq!(dispatcher.rooms().members_of("general").len(), 2);
        assert_eq!(dispatcher.presence().len(), 2);
    }

    #[test]
    fn test_left_notice_uses_name_from_join() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let (a_id, mut a) = connect(&mut dispatcher, "a");
        let (b_id, mut b) = connect(&mut dispatcher, "b");
        dispatcher.on_event(&a_id, ClientEvent::enter_room("Alice", "general"));
        dispatcher.on_event(&b_id, ClientEvent::enter_room("Bob", "general"));
        drain(&mut a);
        drain(&mut b);

        dispatcher.on_event(&b_id, ClientEvent::enter_room("Robert", "random"));

        assert_eq!(
            notices(&drain(&mut a)),
            vec!["Robert has left the room"]
        );
    }

    #[test]
    fn test_custom_notices() {
        let config = DispatcherConfig {
            admin_name: "Relay".into(),
            welcome: "hello".into(),
            ..DispatcherConfig::default()
        };
        let mut dispatcher = Dispatcher::with_config(Hub::new(), config);
        let (_, mut a) = connect(&mut dispatcher, "a");

        let events = drain(&mut a);
        let msg = events[0].as_message().unwrap();
        assert_eq!(msg.name, "Relay");
        assert_eq!(msg.text, "hello");
    }

    #[test]
    fn test_active_rooms_match_presence_over_sequence() {
        let mut dispatcher = Dispatcher::new(Hub::new());
        let mut inboxes = Vec::new();
        let ids: Vec<ConnectionId> = (0..6)
            .map(|i| {
                let (id, rx) = connect(&mut dispatcher, &format!("c{i}"));
                inboxes.push(rx);
                id
            })
            .collect();
        let room_names = ["a", "b", "c"];

        for step in 0..60usize {
            let id = &ids[(step * 7) % ids.len()];
            if step % 5 == 4 {
                dispatcher.on_disconnect(id);
                dispatcher.transport_mut().connect(id.clone());
            } else {
                let room = room_names[(step * 3 + step / 4) % room_names.len()];
                dispatcher.on_enter_room(id, format!("user{step}"), room.to_string());
            }

            let expected: HashSet<String> = dispatcher
                .presence()
                .all()
                .iter()
                .map(|r| r.room.clone())
                .collect();
            let active = dispatcher.rooms().active_rooms();
            assert_eq!(active.len(), expected.len());
            assert_eq!(active.into_iter().collect::<HashSet<_>>(), expected);

            for id in &ids {
                let in_rooms = room_names
                    .iter()
                    .filter(|room| {
                        dispatcher
                            .rooms()
                            .members_of(room)
                            .iter()
                            .any(|r| &r.id == id)
                    })
                    .count();
                assert!(in_rooms <= 1);
            }
        }
    }
}
