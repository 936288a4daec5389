//! # parley-transport
//!
//! Connection abstraction for the Parley chat relay.
//!
//! - **WebSocket** - Text frames carry JSON, binary frames carry
//!   length-prefixed MessagePack
//! - **Memory** - An in-process client/connection pair, for tests and tools
//!
//! ## Connection Abstraction
//!
//! Every transport implements [`Connection`], so the server's connection
//! loop is protocol-agnostic.
//!
//! ```rust,ignore
//! use parley_transport::Connection;
//!
//! async fn handle_connection(mut conn: impl Connection) {
//!     while let Ok(Some(inbound)) = conn.recv().await {
//!         // Hand inbound.frame to the hub
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{pair, pair_with_id, MemoryClient, MemoryConnection};
pub use traits::{Connection, ConnectionId, Encoding, Inbound, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{FrameDecoder, WebSocketConnection};
