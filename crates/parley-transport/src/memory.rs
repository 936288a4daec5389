//! In-memory connections.
//!
//! [`pair`] returns a server-side [`MemoryConnection`] and the
//! [`MemoryClient`] that drives it. Inbound frames travel as JSON text, so
//! they go through the same decoding as WebSocket text frames.

use async_trait::async_trait;
use parley_protocol::{codec, ClientEvent, ClientFrame, ServerEvent};
use tokio::sync::mpsc;
use tracing::debug;

use crate::traits::{Connection, ConnectionId, Encoding, Inbound, TransportError};

/// Create a connected pair with a generated connection ID.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryClient) {
    pair_with_id(ConnectionId::generate())
}

/// Create a connected pair with a fixed connection ID.
#[must_use]
pub fn pair_with_id(id: impl Into<ConnectionId>) -> (MemoryConnection, MemoryClient) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();

    let connection = MemoryConnection {
        id: id.into(),
        inbound: from_client,
        outbound: to_client,
        is_open: true,
    };
    let client = MemoryClient {
        outgoing: to_server,
        incoming: from_server,
        next_ack: 1,
    };
    (connection, client)
}

/// Server side of an in-memory pair.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    is_open: bool,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        let Some(text) = self.inbound.recv().await else {
            debug!(connection = %self.id, "Memory client dropped");
            self.is_open = false;
            return Ok(None);
        };

        let frame = codec::decode_text(&text)?;
        Ok(Some(Inbound {
            frame,
            bytes: text.len(),
        }))
    }

    async fn send(&mut self, event: &ServerEvent) -> Result<usize, TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let size = Encoding::Json.encoded_len(event)?;
        self.outbound
            .send(event.clone())
            .map_err(|_| TransportError::ConnectionClosed)?;
        Ok(size)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open = false;
        self.inbound.close();
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

/// Client side of an in-memory pair.
///
/// Dropping the client closes the connection.
pub struct MemoryClient {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<ServerEvent>,
    next_ack: u64,
}

impl MemoryClient {
    /// Send an event without asking for a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is gone.
    pub fn emit(&self, event: ClientEvent) -> Result<(), TransportError> {
        self.send_frame(ClientFrame::new(event))
    }

    /// Send an event with a fresh ack id. Returns the ack id.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is gone.
    pub fn request(&mut self, event: ClientEvent) -> Result<u64, TransportError> {
        let ack = self.next_ack;
        self.next_ack += 1;
        self.send_frame(ClientFrame::with_ack(ack, event))?;
        Ok(ack)
    }

    /// Send raw text, bypassing encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is gone.
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.outgoing
            .send(text.into())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn send_frame(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.send_text(codec::encode_text(&frame)?)
    }

    /// Next event from the server. `None` once the server side is gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.incoming.recv().await
    }

    /// Next event named `name`, skipping any others.
    pub async fn recv_named(&mut self, name: &str) -> Option<ServerEvent> {
        while let Some(event) = self.incoming.recv().await {
            if event.name() == name {
                return Some(event);
            }
        }
        None
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.incoming.try_recv().ok()
    }
}
