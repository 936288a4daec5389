//! WebSocket connections.
//!
//! Wraps an upgraded axum [`WebSocket`]. Text frames carry JSON, binary
//! frames carry length-prefixed MessagePack; replies go out in the encoding
//! the client used last.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::BytesMut;
use parley_protocol::{codec, ClientFrame, ServerEvent};
use std::net::SocketAddr;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::traits::{Connection, ConnectionId, Encoding, Inbound, TransportError};

/// Decodes inbound WebSocket messages and tracks the reply encoding.
///
/// A binary message may hold several length-prefixed frames, or only part
/// of one; leftovers stay buffered until the next binary message.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_message_size: usize,
    encoding: Encoding,
}

impl FrameDecoder {
    /// Create a decoder for messages of at most `max_message_size` bytes.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_message_size,
            encoding: Encoding::default(),
        }
    }

    /// Encoding for outbound events.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Next complete frame left over from earlier binary messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffered bytes do not decode.
    pub fn buffered(&mut self) -> Result<Option<Inbound>, TransportError> {
        let frame = codec::decode_from::<ClientFrame>(&mut self.buffer)?;
        Ok(frame.map(|frame| Inbound { frame, bytes: 0 }))
    }

    /// Decode a text message as one JSON frame.
    ///
    /// Switches replies to JSON and drops any partial binary frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is too large or does not decode.
    pub fn text(&mut self, text: &str) -> Result<Inbound, TransportError> {
        self.check_size(text.len())?;
        self.encoding = Encoding::Json;
        if !self.buffer.is_empty() {
            debug!(discarded = self.buffer.len(), "Partial binary frame dropped");
            self.buffer.clear();
        }

        let frame = codec::decode_text(text)?;
        Ok(Inbound {
            frame,
            bytes: text.len(),
        })
    }

    /// Buffer a binary message and decode its first complete frame.
    ///
    /// Switches replies to MessagePack. Returns `None` while the frame is
    /// still incomplete.
    ///
    /// # Errors
    ///
    /// Returns an error if the message is too large or does not decode.
    pub fn binary(&mut self, data: &[u8]) -> Result<Option<Inbound>, TransportError> {
        self.check_size(data.len())?;
        self.encoding = Encoding::MessagePack;
        self.buffer.extend_from_slice(data);

        let frame = codec::decode_from::<ClientFrame>(&mut self.buffer)?;
        Ok(frame.map(|frame| Inbound {
            frame,
            bytes: data.len(),
        }))
    }

    /// Encode an event in the current encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn encode(&self, event: &ServerEvent) -> Result<Message, TransportError> {
        Ok(match self.encoding {
            Encoding::Json => Message::Text(codec::encode_text(event)?),
            Encoding::MessagePack => Message::Binary(codec::encode(event)?.to_vec()),
        })
    }

    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size,
                max: self.max_message_size,
            });
        }
        Ok(())
    }
}

/// A WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    is_open: bool,
    decoder: FrameDecoder,
    last_seen: Instant,
}

impl WebSocketConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket, remote_addr: Option<SocketAddr>, max_message_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
            remote_addr,
            is_open: true,
            decoder: FrameDecoder::new(max_message_size),
            last_seen: Instant::now(),
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        if let Some(inbound) = self.decoder.buffered()? {
            return Ok(Some(inbound));
        }

        loop {
            let message = self.socket.recv().await;
            if matches!(message, Some(Ok(_))) {
                self.last_seen = Instant::now();
            }

            match message {
                Some(Ok(Message::Text(text))) => {
                    return self.decoder.text(&text).map(Some);
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Some(inbound) = self.decoder.binary(&data)? {
                        return Ok(Some(inbound));
                    }
                    // Need more data, continue reading
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.socket.send(Message::Pong(data)).await {
                        warn!(connection = %self.id, "Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn send(&mut self, event: &ServerEvent) -> Result<usize, TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let message = self.decoder.encode(event)?;
        let size = match &message {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
            _ => 0,
        };

        self.socket
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(size)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(()); // Already closed
        }
        self.is_open = false;

        self.socket
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {e}")))
    }

    async fn keepalive(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.socket
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to ping: {e}")))
    }

    fn last_seen(&self) -> Option<Instant> {
        Some(self.last_seen)
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::{ClientEvent, ProtocolError};

    fn binary_frame(event: ClientEvent) -> Vec<u8> {
        codec::encode(&ClientFrame::new(event)).unwrap().to_vec()
    }

    fn text_frame(event: ClientEvent) -> String {
        codec::encode_text(&ClientFrame::new(event)).unwrap()
    }

    #[test]
    fn test_decoder_defaults_to_json() {
        let decoder = FrameDecoder::new(1024);
        assert_eq!(decoder.encoding(), Encoding::Json);
        assert!(matches!(
            decoder.encode(&ServerEvent::Pong).unwrap(),
            Message::Text(_)
        ));
    }

    #[test]
    fn test_binary_then_text_switches_reply_encoding() {
        let mut decoder = FrameDecoder::new(1024);

        let data = binary_frame(ClientEvent::Register("alice".into()));
        let inbound = decoder.binary(&data).unwrap().unwrap();
        assert_eq!(inbound.frame, ClientFrame::new(ClientEvent::Register("alice".into())));
        assert_eq!(inbound.bytes, data.len());

        let Message::Binary(reply) = decoder.encode(&ServerEvent::Pong).unwrap() else {
            panic!("expected a binary reply");
        };
        assert_eq!(codec::decode::<ServerEvent>(&reply).unwrap(), ServerEvent::Pong);

        let text = text_frame(ClientEvent::Typing);
        let inbound = decoder.text(&text).unwrap();
        assert_eq!(inbound.frame, ClientFrame::new(ClientEvent::Typing));
        assert_eq!(decoder.encoding(), Encoding::Json);
        assert!(matches!(
            decoder.encode(&ServerEvent::Pong).unwrap(),
            Message::Text(_)
        ));
    }

    #[test]
    fn test_two_frames_in_one_binary_message() {
        let mut decoder = FrameDecoder::new(1024);
        let mut data = binary_frame(ClientEvent::JoinRoom("r".into()));
        data.extend(binary_frame(ClientEvent::ChatMessage("hi".into())));

        let first = decoder.binary(&data).unwrap().unwrap();
        assert_eq!(first.frame, ClientFrame::new(ClientEvent::JoinRoom("r".into())));

        let second = decoder.buffered().unwrap().unwrap();
        assert_eq!(second.frame, ClientFrame::new(ClientEvent::ChatMessage("hi".into())));
        assert_eq!(second.bytes, 0);
        assert!(decoder.buffered().unwrap().is_none());
    }

    #[test]
    fn test_frame_split_across_binary_messages() {
        let mut decoder = FrameDecoder::new(1024);
        let data = binary_frame(ClientEvent::ChatMessage("hello".into()));
        let (head, tail) = data.split_at(data.len() / 2);

        assert!(decoder.binary(head).unwrap().is_none());
        let inbound = decoder.binary(tail).unwrap().unwrap();
        assert_eq!(
            inbound.frame,
            ClientFrame::new(ClientEvent::ChatMessage("hello".into()))
        );
    }

    #[test]
    fn test_text_frame_drops_partial_binary_frame() {
        let mut decoder = FrameDecoder::new(1024);
        let data = binary_frame(ClientEvent::ChatMessage("hello".into()));
        assert!(decoder.binary(&data[..data.len() - 1]).unwrap().is_none());

        decoder.text(&text_frame(ClientEvent::Ping)).unwrap();

        let data = binary_frame(ClientEvent::JoinRoom("r".into()));
        let inbound = decoder.binary(&data).unwrap().unwrap();
        assert_eq!(inbound.frame, ClientFrame::new(ClientEvent::JoinRoom("r".into())));
        assert!(decoder.buffered().unwrap().is_none());
    }

    #[test]
    fn test_oversized_messages_rejected() {
        let mut decoder = FrameDecoder::new(8);

        let err = decoder.text(&text_frame(ClientEvent::Ping)).unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { max: 8, .. }));
        assert!(!err.is_recoverable());

        let err = decoder.binary(&[0; 9]).unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { size: 9, max: 8 }));
    }

    #[test]
    fn test_invalid_text_frame_is_recoverable() {
        let mut decoder = FrameDecoder::new(1024);
        let err = decoder.text("not json").unwrap_err();
        assert!(matches!(err, TransportError::Protocol(ProtocolError::Json(_))));
        assert!(err.is_recoverable());
    }
}
