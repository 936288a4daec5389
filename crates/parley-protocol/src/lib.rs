//! # parley-protocol
//!
//! Wire protocol definitions for the Parley chat relay.
//!
//! This crate defines the events exchanged between Parley clients and the
//! server, the stored message record, and the codecs that put them on the
//! wire.
//!
//! ## Events
//!
//! - `register` / `user_joined` / `user_left` - Identity and roster
//! - `chat_message`, `room_message`, `private_message`, `private_file` - Messaging
//! - `join_room` / `leave_room` / `room_notification` - Room membership
//! - `get_messages`, `search_messages`, `get_unread` - Queries answered with a `reply`
//! - `message_ack`, `private_read`, `private_reaction` - Acknowledgments
//!
//! ## Example
//!
//! ```rust
//! use parley_protocol::{codec, ClientEvent, ClientFrame};
//!
//! let frame = ClientFrame::new(ClientEvent::ChatMessage("Hello, world!".into()));
//!
//! let text = codec::encode_text(&frame).unwrap();
//! let decoded: ClientFrame = codec::decode_text(&text).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod events;
pub mod version;

pub use codec::{decode, decode_text, encode, encode_text, ProtocolError};
pub use events::{
    ChatBroadcast, ClientEvent, ClientFrame, Connected, DeliveryStatus, HistoryQuery,
    MessageAck, MessageRecord, PrivateFileRequest, PrivateMessageRequest, Reaction,
    ReactionRequest, ReadReceipt, ReadReceiptRequest, Reply, ReplyResult, RoomBroadcast,
    RoomMessageRequest, RoomNotification, ScopeSelector, SearchQuery, ServerEvent, UnreadKey,
    UserJoined, UserRef,
};
pub use version::{Version, PROTOCOL_VERSION};
