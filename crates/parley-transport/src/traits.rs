//! Transport abstraction traits for Parley.
//!
//! These traits define the interface every connection type provides, so the
//! server never depends on a concrete transport.

use async_trait::async_trait;
use parley_protocol::{codec, ClientFrame, ProtocolError, ServerEvent};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::time::Instant;

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{timestamp:x}-{seq}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Inbound message exceeds the configured limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Whether the connection can keep going after this error.
    ///
    /// A single undecodable frame is dropped; oversized frames and I/O
    /// failures end the connection.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Protocol(ProtocolError::FrameTooLarge(_) | ProtocolError::Incomplete(_)) => {
                false
            }
            Self::Protocol(_) => true,
            _ => false,
        }
    }
}

/// Wire encoding of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// JSON text frames.
    #[default]
    Json,
    /// Length-prefixed MessagePack binary frames.
    MessagePack,
}

impl Encoding {
    /// Name used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MessagePack => "msgpack",
        }
    }

    /// Encoded size of an event in this encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn encoded_len(self, event: &ServerEvent) -> Result<usize, ProtocolError> {
        Ok(match self {
            Self::Json => codec::encode_text(event)?.len(),
            Self::MessagePack => codec::encode(event)?.len(),
        })
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// The decoded frame.
    pub frame: ClientFrame,
    /// Size of the frame on the wire.
    pub bytes: usize,
}

/// An active connection over a transport.
///
/// Connections handle the bidirectional flow of events between the server
/// and a single client.
#[async_trait]
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next frame from the connection.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError>;

    /// Send an event to the connection. Returns the number of bytes written.
    async fn send(&mut self, event: &ServerEvent) -> Result<usize, TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Send a transport-level keepalive, if the transport has one.
    async fn keepalive(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// When the peer was last heard from, control traffic included.
    ///
    /// `None` for transports without a liveness signal; those never time out.
    fn last_seen(&self) -> Option<Instant> {
        None
    }

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}
