//! Event types for the Parley protocol.
//!
//! Every frame on the wire is an event: a name plus a payload. Client frames
//! may carry an `ack` id when the client expects a reply. Inbound payloads are
//! validated here, at the boundary, so the relay core only ever sees typed
//! events.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::ProtocolError;

/// Event names, as they appear on the wire.
pub mod names {
    pub const REGISTER: &str = "register";
    pub const CHAT_MESSAGE: &str = "chat_message";
    pub const PRIVATE_MESSAGE: &str = "private_message";
    pub const PRIVATE_FILE: &str = "private_file";
    pub const ROOM_MESSAGE: &str = "room_message";
    pub const JOIN_ROOM: &str = "join_room";
    pub const LEAVE_ROOM: &str = "leave_room";
    pub const GET_MESSAGES: &str = "get_messages";
    pub const GET_UNREAD: &str = "get_unread";
    pub const CLEAR_UNREAD: &str = "clear_unread";
    pub const SEARCH_MESSAGES: &str = "search_messages";
    pub const PRIVATE_READ: &str = "private_read";
    pub const PRIVATE_REACTION: &str = "private_reaction";
    pub const TYPING: &str = "typing";
    pub const STOP_TYPING: &str = "stop_typing";
    pub const PING: &str = "ping";
}

/// A user as seen by other users: display name plus connection id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    /// Display name.
    pub username: String,
    /// Connection id of the user.
    pub user_id: String,
}

impl UserRef {
    /// Create a new user reference.
    #[must_use]
    pub fn new(username: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            user_id: user_id.into(),
        }
    }
}

/// A stored message, as kept in history and returned by queries.
///
/// Exactly one of `to` (private) or `room` (room) is set, or neither for the
/// global log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Server-assigned message id.
    pub message_id: String,
    /// Sender identity at the time of sending.
    pub from: UserRef,
    /// Recipient connection id (private scope only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Room name (room scope only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// File payload as a data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Original file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// File MIME type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,
    /// ISO-8601 receipt time.
    pub timestamp: String,
}

impl MessageRecord {
    /// Whether the text or the file name contains `keyword` literally.
    #[must_use]
    pub fn contains(&self, keyword: &str) -> bool {
        let hit = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|value| !value.is_empty() && value.contains(keyword))
        };
        hit(&self.message) || hit(&self.filename)
    }
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// `private_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessageRequest {
    pub to: String,
    #[serde(default)]
    pub message: String,
}

/// `private_file` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateFileRequest {
    pub to: String,
    pub file: String,
    pub filename: String,
    pub filetype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `room_message` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessageRequest {
    pub room: String,
    #[serde(default)]
    pub message: String,
}

/// Selects a history log from the requester's point of view.
///
/// `kind` is one of `global`, `room` or `private`; anything else selects
/// nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSelector {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl ScopeSelector {
    /// Select the global log.
    #[must_use]
    pub fn global() -> Self {
        Self {
            kind: "global".to_string(),
            ..Self::default()
        }
    }

    /// Select a room log.
    #[must_use]
    pub fn room(room: impl Into<String>) -> Self {
        Self {
            kind: "room".to_string(),
            room: Some(room.into()),
            to: None,
        }
    }

    /// Select the private log shared with `to`.
    #[must_use]
    pub fn private(to: impl Into<String>) -> Self {
        Self {
            kind: "private".to_string(),
            room: None,
            to: Some(to.into()),
        }
    }
}

fn default_page() -> i64 {
    1
}

/// `get_messages` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(flatten)]
    pub scope: ScopeSelector,
    #[serde(default = "default_page")]
    pub page: i64,
    /// Falls back to the server's configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
}

/// `search_messages` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(flatten)]
    pub scope: ScopeSelector,
    #[serde(default)]
    pub keyword: String,
}

/// `get_unread` / `clear_unread` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadKey {
    pub key: String,
}

/// `private_read` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceiptRequest {
    /// Connection id of the original sender.
    pub from: String,
    pub message_id: String,
}

/// `private_reaction` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub to: String,
    pub message_id: String,
    pub reaction: String,
}

/// A typed inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Bind a display name to this connection.
    Register(String),
    /// Global broadcast message.
    ChatMessage(String),
    PrivateMessage(PrivateMessageRequest),
    PrivateFile(PrivateFileRequest),
    RoomMessage(RoomMessageRequest),
    JoinRoom(String),
    LeaveRoom(String),
    GetMessages(HistoryQuery),
    GetUnread(UnreadKey),
    ClearUnread(UnreadKey),
    SearchMessages(SearchQuery),
    PrivateRead(ReadReceiptRequest),
    PrivateReaction(ReactionRequest),
    Typing,
    StopTyping,
    /// Keepalive.
    Ping,
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|source| ProtocolError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}

impl ClientEvent {
    /// Build a typed event from its wire name and raw payload.
    ///
    /// Payloads of `typing`, `stop_typing` and `ping` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown event names or payloads that do not match
    /// the event's shape.
    pub fn from_parts(event: &str, data: Value) -> Result<Self, ProtocolError> {
        let parsed = match event {
            names::REGISTER => Self::Register(payload(event, data)?),
            names::CHAT_MESSAGE => Self::ChatMessage(payload(event, data)?),
            names::PRIVATE_MESSAGE => Self::PrivateMessage(payload(event, data)?),
            names::PRIVATE_FILE => Self::PrivateFile(payload(event, data)?),
            names::ROOM_MESSAGE => Self::RoomMessage(payload(event, data)?),
            names::JOIN_ROOM => Self::JoinRoom(payload(event, data)?),
            names::LEAVE_ROOM => Self::LeaveRoom(payload(event, data)?),
            names::GET_MESSAGES => Self::GetMessages(payload(event, data)?),
            names::GET_UNREAD => Self::GetUnread(payload(event, data)?),
            names::CLEAR_UNREAD => Self::ClearUnread(payload(event, data)?),
            names::SEARCH_MESSAGES => Self::SearchMessages(payload(event, data)?),
            names::PRIVATE_READ => Self::PrivateRead(payload(event, data)?),
            names::PRIVATE_REACTION => Self::PrivateReaction(payload(event, data)?),
            names::TYPING => Self::Typing,
            names::STOP_TYPING => Self::StopTyping,
            names::PING => Self::Ping,
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(parsed)
    }

    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => names::REGISTER,
            Self::ChatMessage(_) => names::CHAT_MESSAGE,
            Self::PrivateMessage(_) => names::PRIVATE_MESSAGE,
            Self::PrivateFile(_) => names::PRIVATE_FILE,
            Self::RoomMessage(_) => names::ROOM_MESSAGE,
            Self::JoinRoom(_) => names::JOIN_ROOM,
            Self::LeaveRoom(_) => names::LEAVE_ROOM,
            Self::GetMessages(_) => names::GET_MESSAGES,
            Self::GetUnread(_) => names::GET_UNREAD,
            Self::ClearUnread(_) => names::CLEAR_UNREAD,
            Self::SearchMessages(_) => names::SEARCH_MESSAGES,
            Self::PrivateRead(_) => names::PRIVATE_READ,
            Self::PrivateReaction(_) => names::PRIVATE_REACTION,
            Self::Typing => names::TYPING,
            Self::StopTyping => names::STOP_TYPING,
            Self::Ping => names::PING,
        }
    }

    /// The raw payload of this event.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Register(name) => serde_json::to_value(name),
            Self::ChatMessage(text) => serde_json::to_value(text),
            Self::PrivateMessage(p) => serde_json::to_value(p),
            Self::PrivateFile(p) => serde_json::to_value(p),
            Self::RoomMessage(p) => serde_json::to_value(p),
            Self::JoinRoom(room) | Self::LeaveRoom(room) => serde_json::to_value(room),
            Self::GetMessages(q) => serde_json::to_value(q),
            Self::GetUnread(k) | Self::ClearUnread(k) => serde_json::to_value(k),
            Self::SearchMessages(q) => serde_json::to_value(q),
            Self::PrivateRead(p) => serde_json::to_value(p),
            Self::PrivateReaction(p) => serde_json::to_value(p),
            Self::Typing | Self::StopTyping | Self::Ping => Ok(Value::Null),
        }
    }
}

/// Untyped client frame as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

/// A validated client frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame", into = "RawFrame")]
pub struct ClientFrame {
    /// Reply id, present when the client expects a reply.
    pub ack: Option<u64>,
    pub event: ClientEvent,
}

impl ClientFrame {
    /// A frame that expects no reply.
    #[must_use]
    pub fn new(event: ClientEvent) -> Self {
        Self { ack: None, event }
    }

    /// A frame that expects a reply tagged with `ack`.
    #[must_use]
    pub fn with_ack(ack: u64, event: ClientEvent) -> Self {
        Self {
            ack: Some(ack),
            event,
        }
    }
}

impl TryFrom<RawFrame> for ClientFrame {
    type Error = ProtocolError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        Ok(Self {
            ack: raw.ack,
            event: ClientEvent::from_parts(&raw.event, raw.data)?,
        })
    }
}

impl From<ClientFrame> for RawFrame {
    fn from(frame: ClientFrame) -> Self {
        Self {
            event: frame.event.name().to_string(),
            data: frame.event.data().unwrap_or(Value::Null),
            ack: frame.ack,
        }
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// `chat_message` broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcast {
    pub username: String,
    pub message: String,
    pub timestamp: String,
    pub user_id: String,
    pub message_id: String,
}

/// `room_message` multicast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomBroadcast {
    pub username: String,
    pub message: String,
    pub timestamp: String,
    pub room: String,
    pub user_id: String,
    pub message_id: String,
}

/// `user_joined` broadcast, with the full roster of display names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoined {
    pub username: String,
    pub user_id: String,
    pub users: Vec<String>,
}

/// `room_notification` for joins and leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomNotification {
    /// Human-readable text, e.g. `alice joined room lobby`.
    pub message: String,
    pub room: String,
    pub username: String,
    pub user_id: String,
}

/// Delivery status carried by `message_ack`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Accepted and stored by the server.
    Delivered,
}

/// `message_ack`, sent to the sender only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAck {
    pub message_id: String,
    pub status: DeliveryStatus,
    pub timestamp: String,
}

/// `private_read` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: String,
    pub reader: UserRef,
    pub read_at: String,
}

/// `private_reaction` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub message_id: String,
    pub reaction: String,
    pub reactor: UserRef,
    pub reacted_at: String,
}

/// Handshake sent once per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub connection_id: String,
    pub version: String,
    /// Recommended heartbeat interval in milliseconds.
    pub heartbeat: u32,
}

/// Result of a query event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyResult {
    /// `get_unread`.
    Count(u64),
    /// `get_messages` and `search_messages`.
    Messages(Vec<MessageRecord>),
}

/// Reply to a client frame that carried an `ack` id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub ack: u64,
    pub result: ReplyResult,
}

/// A typed outbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(Connected),
    ChatMessage(ChatBroadcast),
    PrivateMessage(MessageRecord),
    PrivateFile(MessageRecord),
    RoomMessage(RoomBroadcast),
    UserJoined(UserJoined),
    UserLeft(UserRef),
    RoomNotification(RoomNotification),
    MessageAck(MessageAck),
    PrivateRead(ReadReceipt),
    PrivateReaction(Reaction),
    Typing(UserRef),
    StopTyping(UserRef),
    Reply(Reply),
    Pong,
}

impl ServerEvent {
    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::ChatMessage(_) => names::CHAT_MESSAGE,
            Self::PrivateMessage(_) => names::PRIVATE_MESSAGE,
            Self::PrivateFile(_) => names::PRIVATE_FILE,
            Self::RoomMessage(_) => names::ROOM_MESSAGE,
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft(_) => "user_left",
            Self::RoomNotification(_) => "room_notification",
            Self::MessageAck(_) => "message_ack",
            Self::PrivateRead(_) => names::PRIVATE_READ,
            Self::PrivateReaction(_) => names::PRIVATE_REACTION,
            Self::Typing(_) => names::TYPING,
            Self::StopTyping(_) => names::STOP_TYPING,
            Self::Reply(_) => "reply",
            Self::Pong => "pong",
        }
    }

    /// Create a reply event.
    #[must_use]
    pub fn reply(ack: u64, result: ReplyResult) -> Self {
        Self::Reply(Reply { ack, result })
    }
}
