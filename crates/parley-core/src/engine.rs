//! The delivery engine.
//!
//! Every inbound event for a connection goes through [`DeliveryEngine::handle`].
//! Messages are stamped, persisted, counted as unread for their recipients and
//! fanned out; the sender gets a `message_ack`. The engine never talks to the
//! network itself: it returns [`Delivery`] values that name a [`Target`], and
//! the caller resolves targets to live connections.

use crate::identity::IdentityRegistry;
use crate::message::{iso_timestamp, MessageIdGenerator, Scope, ScopeKind};
use crate::query::QueryService;
use crate::rooms::RoomMembership;
use crate::store::{MessageStore, StoreStats};
use crate::unread::UnreadTracker;
use chrono::Utc;
use parley_protocol::{
    ChatBroadcast, ClientEvent, DeliveryStatus, HistoryQuery, MessageAck, MessageRecord,
    PrivateFileRequest, PrivateMessageRequest, Reaction, ReactionRequest, ReadReceipt,
    ReadReceiptRequest, ReplyResult, RoomBroadcast, RoomMessageRequest, RoomNotification,
    SearchQuery, ServerEvent, UserJoined,
};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Page size used when `get_messages` does not name one.
    pub default_page_size: i64,
    /// Drop room memberships and unread counters of a connection on
    /// disconnect instead of leaving them orphaned.
    pub purge_on_disconnect: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            purge_on_disconnect: false,
        }
    }
}

/// Where a delivery goes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A single connection, if it is still live.
    Connection(String),
    /// Every live connection.
    Everyone,
    /// Every live connection but one.
    EveryoneExcept(String),
    /// Every live member of a room.
    Room(String),
}

/// An outbound event and its target.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: Target,
    /// Shared so fan-out never copies the payload.
    pub event: Arc<ServerEvent>,
}

impl Delivery {
    /// Deliver to one connection.
    #[must_use]
    pub fn to(connection_id: impl Into<String>, event: ServerEvent) -> Self {
        Self {
            target: Target::Connection(connection_id.into()),
            event: Arc::new(event),
        }
    }

    /// Deliver to every connection.
    #[must_use]
    pub fn everyone(event: ServerEvent) -> Self {
        Self {
            target: Target::Everyone,
            event: Arc::new(event),
        }
    }

    /// Deliver to every connection except `connection_id`.
    #[must_use]
    pub fn everyone_except(connection_id: impl Into<String>, event: ServerEvent) -> Self {
        Self {
            target: Target::EveryoneExcept(connection_id.into()),
            event: Arc::new(event),
        }
    }

    /// Deliver to the members of a room.
    #[must_use]
    pub fn room(room: impl Into<String>, event: ServerEvent) -> Self {
        Self {
            target: Target::Room(room.into()),
            event: Arc::new(event),
        }
    }
}

/// Everything produced by handling one inbound event.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Events to emit, in order.
    pub deliveries: Vec<Delivery>,
    /// Reply for query events.
    pub reply: Option<ReplyResult>,
    /// Scope of the message stored by this event, if any.
    pub stored: Option<ScopeKind>,
}

impl Outcome {
    fn deliver(deliveries: Vec<Delivery>) -> Self {
        Self {
            deliveries,
            ..Self::default()
        }
    }

    fn stored(kind: ScopeKind, deliveries: Vec<Delivery>) -> Self {
        Self {
            deliveries,
            reply: None,
            stored: Some(kind),
        }
    }

    fn reply(result: ReplyResult) -> Self {
        Self {
            reply: Some(result),
            ..Self::default()
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    /// Registered connections.
    pub registered: usize,
    /// Known rooms.
    pub rooms: usize,
    /// History statistics.
    pub store: StoreStats,
}

/// The relay's session, routing and history state.
///
/// One engine serves the whole process. It is not shared: a single owner
/// feeds it events one at a time.
#[derive(Debug, Default)]
pub struct DeliveryEngine {
    identities: IdentityRegistry,
    rooms: RoomMembership,
    store: MessageStore,
    unread: UnreadTracker,
    ids: MessageIdGenerator,
    config: EngineConfig,
}

impl DeliveryEngine {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom configuration.
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        info!("Creating delivery engine with config: {:?}", config);
        Self {
            config,
            ..Self::default()
        }
    }

    /// Identity registry.
    #[must_use]
    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    /// Room membership.
    #[must_use]
    pub fn rooms(&self) -> &RoomMembership {
        &self.rooms
    }

    /// Message history.
    #[must_use]
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Unread counters.
    #[must_use]
    pub fn unread_tracker(&self) -> &UnreadTracker {
        &self.unread
    }

    /// Queries over the message history.
    #[must_use]
    pub fn queries(&self) -> QueryService<'_> {
        QueryService::new(&self.store)
    }

    /// Engine statistics.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            registered: self.identities.len(),
            rooms: self.rooms.room_count(),
            store: self.store.stats(),
        }
    }

    /// Handle one inbound event from `connection_id`.
    ///
    /// Never fails: invalid input degrades to an empty outcome.
    pub fn handle(&mut self, connection_id: &str, event: ClientEvent) -> Outcome {
        trace!(connection = %connection_id, event = event.name(), "Handling event");

        match event {
            ClientEvent::Register(name) => Outcome::deliver(self.register(connection_id, name)),
            ClientEvent::ChatMessage(text) => {
                Outcome::stored(ScopeKind::Global, self.send_global(connection_id, text))
            }
            ClientEvent::PrivateMessage(request) => {
                Outcome::stored(ScopeKind::Private, self.send_private(connection_id, request))
            }
            ClientEvent::PrivateFile(request) => Outcome::stored(
                ScopeKind::Private,
                self.send_private_file(connection_id, request),
            ),
            ClientEvent::RoomMessage(request) => {
                Outcome::stored(ScopeKind::Room, self.send_room(connection_id, request))
            }
            ClientEvent::JoinRoom(room) => Outcome::deliver(self.join_room(connection_id, &room)),
            ClientEvent::LeaveRoom(room) => Outcome::deliver(self.leave_room(connection_id, &room)),
            ClientEvent::GetMessages(query) => {
                Outcome::reply(ReplyResult::Messages(self.history(connection_id, &query)))
            }
            ClientEvent::GetUnread(key) => {
                Outcome::reply(ReplyResult::Count(self.unread(connection_id, &key.key)))
            }
            ClientEvent::ClearUnread(key) => {
                self.clear_unread(connection_id, &key.key);
                Outcome::default()
            }
            ClientEvent::SearchMessages(query) => {
                Outcome::reply(ReplyResult::Messages(self.search(connection_id, &query)))
            }
            ClientEvent::PrivateRead(request) => {
                Outcome::deliver(vec![self.read_receipt(connection_id, request)])
            }
            ClientEvent::PrivateReaction(request) => {
                Outcome::deliver(self.react(connection_id, request))
            }
            ClientEvent::Typing => Outcome::deliver(vec![self.typing(connection_id, true)]),
            ClientEvent::StopTyping => Outcome::deliver(vec![self.typing(connection_id, false)]),
            ClientEvent::Ping => {
                Outcome::deliver(vec![Delivery::to(connection_id, ServerEvent::Pong)])
            }
        }
    }

    /// Bind a display name and announce the updated roster to everyone.
    pub fn register(&mut self, connection_id: &str, display_name: String) -> Vec<Delivery> {
        self.identities.register(connection_id, display_name.clone());
        info!(connection = %connection_id, "{} joined the chat", display_name);

        vec![Delivery::everyone(ServerEvent::UserJoined(UserJoined {
            username: display_name,
            user_id: connection_id.to_string(),
            users: self.identities.roster(),
        }))]
    }

    /// Store a global message and broadcast it to every connection.
    pub fn send_global(&mut self, connection_id: &str, text: String) -> Vec<Delivery> {
        let (message_id, timestamp) = self.stamp(connection_id);
        let sender = self.identities.user_ref(connection_id);

        self.store.append(
            &Scope::Global,
            MessageRecord {
                message_id: message_id.clone(),
                from: sender.clone(),
                to: None,
                room: None,
                message: Some(text.clone()),
                file: None,
                filename: None,
                filetype: None,
                timestamp: timestamp.clone(),
            },
        );
        debug!(connection = %connection_id, "[{}] {}: {}", timestamp, sender.username, text);

        let ack = ack(connection_id, &message_id, &timestamp);
        vec![
            Delivery::everyone(ServerEvent::ChatMessage(ChatBroadcast {
                username: sender.username,
                message: text,
                timestamp,
                user_id: sender.user_id,
                message_id,
            })),
            ack,
        ]
    }

    /// Store a private text message and deliver it to both participants.
    pub fn send_private(
        &mut self,
        connection_id: &str,
        request: PrivateMessageRequest,
    ) -> Vec<Delivery> {
        let (message_id, timestamp) = self.stamp(connection_id);
        let record = MessageRecord {
            message_id,
            from: self.identities.user_ref(connection_id),
            to: Some(request.to.clone()),
            room: None,
            message: Some(request.message),
            file: None,
            filename: None,
            filetype: None,
            timestamp,
        };
        debug!(connection = %connection_id, to = %request.to, "Private message");
        self.deliver_private(connection_id, &request.to, record, ServerEvent::PrivateMessage)
    }

    /// Store a private file message and deliver it to both participants.
    pub fn send_private_file(
        &mut self,
        connection_id: &str,
        request: PrivateFileRequest,
    ) -> Vec<Delivery> {
        let (message_id, timestamp) = self.stamp(connection_id);
        debug!(
            connection = %connection_id,
            to = %request.to,
            "Private file: {} ({})",
            request.filename,
            request.filetype
        );
        let record = MessageRecord {
            message_id,
            from: self.identities.user_ref(connection_id),
            to: Some(request.to.clone()),
            room: None,
            message: request.message,
            file: Some(request.file),
            filename: Some(request.filename),
            filetype: Some(request.filetype),
            timestamp,
        };
        self.deliver_private(connection_id, &request.to, record, ServerEvent::PrivateFile)
    }

    fn deliver_private(
        &mut self,
        sender: &str,
        recipient: &str,
        record: MessageRecord,
        wrap: fn(MessageRecord) -> ServerEvent,
    ) -> Vec<Delivery> {
        let scope = Scope::private(sender, recipient);
        self.store.append(&scope, record.clone());

        let ack = ack(sender, &record.message_id, &record.timestamp);
        let event = Arc::new(wrap(record));
        let mut deliveries = Vec::with_capacity(3);

        if recipient != sender {
            self.unread.increment(recipient, scope.key());
            deliveries.push(Delivery {
                target: Target::Connection(recipient.to_string()),
                event: Arc::clone(&event),
            });
        }
        // Echo so the sender sees the stored form
        deliveries.push(Delivery {
            target: Target::Connection(sender.to_string()),
            event,
        });
        deliveries.push(ack);
        deliveries
    }

    /// Store a room message, deliver it to the room and count it as unread
    /// for every member but the sender.
    pub fn send_room(&mut self, connection_id: &str, request: RoomMessageRequest) -> Vec<Delivery> {
        let (message_id, timestamp) = self.stamp(connection_id);
        let sender = self.identities.user_ref(connection_id);
        let scope = Scope::room(request.room.clone());

        self.store.append(
            &scope,
            MessageRecord {
                message_id: message_id.clone(),
                from: sender.clone(),
                to: None,
                room: Some(request.room.clone()),
                message: Some(request.message.clone()),
                file: None,
                filename: None,
                filetype: None,
                timestamp: timestamp.clone(),
            },
        );

        let mut counted = 0usize;
        for member in self.rooms.members(&request.room) {
            if member != connection_id {
                self.unread.increment(member, scope.key());
                counted += 1;
            }
        }
        debug!(
            room = %request.room,
            unread_updates = counted,
            "[{}] [{}] {}: {}",
            timestamp,
            request.room,
            sender.username,
            request.message
        );

        let ack = ack(connection_id, &message_id, &timestamp);
        vec![
            Delivery::room(
                request.room.clone(),
                ServerEvent::RoomMessage(RoomBroadcast {
                    username: sender.username,
                    message: request.message,
                    timestamp,
                    room: request.room,
                    user_id: sender.user_id,
                    message_id,
                }),
            ),
            ack,
        ]
    }

    /// Add a connection to a room and notify the room, joiner included.
    pub fn join_room(&mut self, connection_id: &str, room: &str) -> Vec<Delivery> {
        self.rooms.join(connection_id, room);
        vec![self.room_notification(connection_id, room, "joined")]
    }

    /// Remove a connection from a room and notify the remaining members.
    pub fn leave_room(&mut self, connection_id: &str, room: &str) -> Vec<Delivery> {
        self.rooms.leave(connection_id, room);
        vec![self.room_notification(connection_id, room, "left")]
    }

    fn room_notification(&self, connection_id: &str, room: &str, verb: &str) -> Delivery {
        let username = self.identities.resolve(connection_id);
        info!(connection = %connection_id, "{} {} room: {}", username, verb, room);

        Delivery::room(
            room,
            ServerEvent::RoomNotification(RoomNotification {
                message: format!("{username} {verb} room {room}"),
                room: room.to_string(),
                username: username.to_string(),
                user_id: connection_id.to_string(),
            }),
        )
    }

    /// One page of history, as seen by `connection_id`.
    #[must_use]
    pub fn history(&self, connection_id: &str, query: &HistoryQuery) -> Vec<MessageRecord> {
        let Some(scope) = Scope::from_selector(&query.scope, connection_id) else {
            debug!(connection = %connection_id, kind = %query.scope.kind, "History for unknown scope");
            return Vec::new();
        };

        let page_size = query.page_size.unwrap_or(self.config.default_page_size);

        self.queries()
            .paginate(&scope, query.page, page_size)
            .to_vec()
    }

    /// Keyword search, as seen by `connection_id`.
    #[must_use]
    pub fn search(&self, connection_id: &str, query: &SearchQuery) -> Vec<MessageRecord> {
        let Some(scope) = Scope::from_selector(&query.scope, connection_id) else {
            debug!(connection = %connection_id, kind = %query.scope.kind, "Search in unknown scope");
            return Vec::new();
        };

        self.queries()
            .search(&scope, &query.keyword)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Unread count of `connection_id` under `key`.
    #[must_use]
    pub fn unread(&self, connection_id: &str, key: &str) -> u64 {
        self.unread.get(connection_id, key)
    }

    /// Reset the unread count of `connection_id` under `key`.
    pub fn clear_unread(&mut self, connection_id: &str, key: &str) {
        self.unread.clear(connection_id, key);
        trace!(connection = %connection_id, key = %key, "Cleared unread");
    }

    /// Forward a read receipt to the original sender.
    #[must_use]
    pub fn read_receipt(&self, connection_id: &str, request: ReadReceiptRequest) -> Delivery {
        let reader = self.identities.user_ref(connection_id);
        debug!(
            "[READ RECEIPT] Message {} read by {} ({})",
            request.message_id, reader.username, reader.user_id
        );

        Delivery::to(
            request.from,
            ServerEvent::PrivateRead(ReadReceipt {
                message_id: request.message_id,
                reader,
                read_at: iso_timestamp(Utc::now()),
            }),
        )
    }

    /// Forward a reaction to the other participant and back to the reactor.
    #[must_use]
    pub fn react(&self, connection_id: &str, request: ReactionRequest) -> Vec<Delivery> {
        let reactor = self.identities.user_ref(connection_id);
        debug!(
            "[REACTION] Message {} reacted with '{}' by {} ({})",
            request.message_id, request.reaction, reactor.username, reactor.user_id
        );

        let event = Arc::new(ServerEvent::PrivateReaction(Reaction {
            message_id: request.message_id,
            reaction: request.reaction,
            reactor,
            reacted_at: iso_timestamp(Utc::now()),
        }));

        let mut deliveries = Vec::with_capacity(2);
        if request.to != connection_id {
            deliveries.push(Delivery {
                target: Target::Connection(request.to),
                event: Arc::clone(&event),
            });
        }
        deliveries.push(Delivery {
            target: Target::Connection(connection_id.to_string()),
            event,
        });
        deliveries
    }

    /// Typing indicator for everyone but the typist.
    #[must_use]
    pub fn typing(&self, connection_id: &str, started: bool) -> Delivery {
        let user = self.identities.user_ref(connection_id);
        let event = if started {
            ServerEvent::Typing(user)
        } else {
            ServerEvent::StopTyping(user)
        };
        Delivery::everyone_except(connection_id, event)
    }

    /// Clean up after a lost connection.
    ///
    /// Announces the departure if the connection had registered. Messages
    /// already stored are kept.
    pub fn disconnect(&mut self, connection_id: &str) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        if let Some(identity) = self.identities.unregister(connection_id) {
            info!(connection = %connection_id, "{} left the chat", identity.display_name);
            deliveries.push(Delivery::everyone(ServerEvent::UserLeft(identity.user_ref())));
        }

        if self.config.purge_on_disconnect {
            let rooms = self.rooms.forget(connection_id);
            self.unread.forget(connection_id);
            debug!(connection = %connection_id, rooms = rooms.len(), "Purged connection state");
        }

        deliveries
    }

    fn stamp(&mut self, connection_id: &str) -> (String, String) {
        let now = Utc::now();
        (self.ids.generate(connection_id, now), iso_timestamp(now))
    }
}

fn ack(connection_id: &str, message_id: &str, timestamp: &str) -> Delivery {
    Delivery::to(
        connection_id,
        ServerEvent::MessageAck(MessageAck {
            message_id: message_id.to_string(),
            status: DeliveryStatus::Delivered,
            timestamp: timestamp.to_string(),
        }),
    )
}
