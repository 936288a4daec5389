//! The hub: single owner of the delivery engine.
//!
//! Connection tasks talk to the hub over a command channel. The hub applies
//! commands in arrival order, so every engine operation is atomic with
//! respect to every other, and resolves delivery targets against the live
//! session map.

use crate::metrics;
use dashmap::DashMap;
use parley_core::{Delivery, DeliveryEngine, EngineConfig, Target};
use parley_protocol::{ClientFrame, ServerEvent};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Outbound queue of one connection.
pub type Outbox = mpsc::UnboundedSender<Arc<ServerEvent>>;

/// Live connections: connection id -> outbound queue.
pub type Sessions = Arc<DashMap<String, Outbox>>;

/// Commands accepted by the hub.
#[derive(Debug)]
pub enum HubCommand {
    /// A connection became live.
    Connect {
        connection_id: String,
        outbox: Outbox,
    },
    /// A connection sent a frame.
    Event {
        connection_id: String,
        frame: ClientFrame,
    },
    /// A connection went away.
    Disconnect { connection_id: String },
}

/// Cheap, cloneable handle to a running hub.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
    sessions: Sessions,
}

impl HubHandle {
    /// Register a live connection and its outbound queue.
    pub fn connect(&self, connection_id: impl Into<String>, outbox: Outbox) {
        self.submit(HubCommand::Connect {
            connection_id: connection_id.into(),
            outbox,
        });
    }

    /// Submit an inbound frame.
    pub fn event(&self, connection_id: impl Into<String>, frame: ClientFrame) {
        self.submit(HubCommand::Event {
            connection_id: connection_id.into(),
            frame,
        });
    }

    /// Report a lost connection.
    pub fn disconnect(&self, connection_id: impl Into<String>) {
        self.submit(HubCommand::Disconnect {
            connection_id: connection_id.into(),
        });
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    fn submit(&self, command: HubCommand) {
        if self.commands.send(command).is_err() {
            debug!("Hub stopped, command dropped");
        }
    }
}

/// The hub task state.
pub struct Hub {
    engine: DeliveryEngine,
    sessions: Sessions,
}

impl Hub {
    /// Create a hub around a fresh engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: DeliveryEngine::with_config(config),
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Spawn the hub on the current runtime.
    ///
    /// The hub runs until every [`HubHandle`] is dropped.
    #[must_use]
    pub fn spawn(config: EngineConfig) -> (HubHandle, JoinHandle<()>) {
        let hub = Self::new(config);
        let (commands, receiver) = mpsc::unbounded_channel();
        let handle = HubHandle {
            commands,
            sessions: Arc::clone(&hub.sessions),
        };
        let task = tokio::spawn(hub.run(receiver));
        (handle, task)
    }

    /// Apply commands until the channel closes.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HubCommand>) {
        info!("Hub started");
        while let Some(command) = commands.recv().await {
            self.apply(command);
        }
        info!("Hub stopped");
    }

    /// Apply a single command.
    pub fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect {
                connection_id,
                outbox,
            } => {
                debug!(connection = %connection_id, "Session opened");
                self.sessions.insert(connection_id, outbox);
            }
            HubCommand::Event {
                connection_id,
                frame,
            } => self.handle_frame(&connection_id, frame),
            HubCommand::Disconnect { connection_id } => {
                self.sessions.remove(&connection_id);
                let deliveries = self.engine.disconnect(&connection_id);
                self.dispatch(deliveries);
                self.update_gauges();
                debug!(connection = %connection_id, "Session closed");
            }
        }
    }

    fn handle_frame(&mut self, connection_id: &str, frame: ClientFrame) {
        let start = Instant::now();
        let ClientFrame { ack, event } = frame;

        let outcome = self.engine.handle(connection_id, event);
        if let Some(kind) = outcome.stored {
            metrics::record_stored(kind.as_str());
        }
        self.dispatch(outcome.deliveries);

        match (outcome.reply, ack) {
            (Some(result), Some(ack)) => {
                self.send_to(connection_id, Arc::new(ServerEvent::reply(ack, result)));
            }
            (Some(_), None) => {
                trace!(connection = %connection_id, "No ack id, reply skipped");
            }
            _ => {}
        }

        self.update_gauges();
        metrics::record_latency(start.elapsed().as_secs_f64());
    }

    fn dispatch(&self, deliveries: Vec<Delivery>) {
        for Delivery { target, event } in deliveries {
            let recipients = match &target {
                Target::Connection(id) => usize::from(self.send_to(id, Arc::clone(&event))),
                Target::Everyone => self.broadcast(&event, None),
                Target::EveryoneExcept(id) => self.broadcast(&event, Some(id)),
                Target::Room(room) => self
                    .engine
                    .rooms()
                    .members(room)
                    .iter()
                    .filter(|member| self.send_to(member, Arc::clone(&event)))
                    .count(),
            };
            trace!(event = event.name(), target = ?target, recipients, "Dispatched");
        }
    }

    fn broadcast(&self, event: &Arc<ServerEvent>, except: Option<&str>) -> usize {
        let mut count = 0;
        for session in self.sessions.iter() {
            if except == Some(session.key().as_str()) {
                continue;
            }
            if session.value().send(Arc::clone(event)).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Queue an event for one connection. Returns `false` if it is not live.
    fn send_to(&self, connection_id: &str, event: Arc<ServerEvent>) -> bool {
        match self.sessions.get(connection_id) {
            Some(outbox) => outbox.send(event).is_ok(),
            None => {
                debug!(connection = %connection_id, "Target not connected, dropped");
                false
            }
        }
    }

    fn update_gauges(&self) {
        let stats = self.engine.stats();
        metrics::set_engine_gauges(stats.rooms, stats.registered);
    }

    /// The engine, for inspection.
    #[must_use]
    pub fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::{ClientEvent, ReadReceiptRequest, ReplyResult, UnreadKey};

    fn session(hub: &mut Hub, id: &str) -> mpsc::UnboundedReceiver<Arc<ServerEvent>> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        hub.apply(HubCommand::Connect {
            connection_id: id.to_string(),
            outbox,
        });
        inbox
    }

    fn event(hub: &mut Hub, id: &str, frame: ClientFrame) {
        hub.apply(HubCommand::Event {
            connection_id: id.to_string(),
            frame,
        });
    }

    fn drain(inbox: &mut mpsc::UnboundedReceiver<Arc<ServerEvent>>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = inbox.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[test]
    fn test_broadcast_reaches_all_sessions() {
        let mut hub = Hub::new(EngineConfig::default());
        let mut a = session(&mut hub, "a");
        let mut b = session(&mut hub, "b");

        event(&mut hub, "a", ClientFrame::new(ClientEvent::ChatMessage("hi".into())));

        assert_eq!(drain(&mut a), vec!["chat_message", "message_ack"]);
        assert_eq!(drain(&mut b), vec!["chat_message"]);
    }

    #[test]
    fn test_room_delivery_only_to_members() {
        let mut hub = Hub::new(EngineConfig::default());
        let mut a = session(&mut hub, "a");
        let mut b = session(&mut hub, "b");
        let mut c = session(&mut hub, "c");

        event(&mut hub, "a", ClientFrame::new(ClientEvent::JoinRoom("r".into())));
        event(&mut hub, "b", ClientFrame::new(ClientEvent::JoinRoom("r".into())));
        drain(&mut a);
        drain(&mut b);

        event(
            &mut hub,
            "a",
            ClientFrame::new(ClientEvent::RoomMessage(parley_protocol::RoomMessageRequest {
                room: "r".into(),
                message: "hey".into(),
            })),
        );

        assert_eq!(drain(&mut a), vec!["room_message", "message_ack"]);
        assert_eq!(drain(&mut b), vec!["room_message"]);
        assert!(drain(&mut c).is_empty());
    }

    #[test]
    fn test_reply_requires_ack() {
        let mut hub = Hub::new(EngineConfig::default());
        let mut a = session(&mut hub, "a");
        let query = ClientEvent::GetUnread(UnreadKey { key: "r".into() });

        event(&mut hub, "a", ClientFrame::new(query.clone()));
        assert!(drain(&mut a).is_empty());

        event(&mut hub, "a", ClientFrame::with_ack(7, query));
        let reply = a.try_recv().unwrap();
        assert_eq!(
            reply.as_ref(),
            &ServerEvent::reply(7, ReplyResult::Count(0))
        );
    }

    #[test]
    fn test_read_receipt_to_disconnected_sender() {
        let mut hub = Hub::new(EngineConfig::default());
        let mut bob = session(&mut hub, "bob");
        let _alice = session(&mut hub, "alice");
        hub.apply(HubCommand::Disconnect {
            connection_id: "alice".into(),
        });

        event(
            &mut hub,
            "bob",
            ClientFrame::new(ClientEvent::PrivateRead(ReadReceiptRequest {
                from: "alice".into(),
                message_id: "alice_1-1".into(),
            })),
        );

        assert!(drain(&mut bob).is_empty());
        assert_eq!(hub.sessions.len(), 1);
    }

    #[test]
    fn test_disconnect_announces_registered() {
        let mut hub = Hub::new(EngineConfig::default());
        let mut a = session(&mut hub, "a");
        let _b = session(&mut hub, "b");
        event(&mut hub, "b", ClientFrame::new(ClientEvent::Register("bob".into())));
        drain(&mut a);

        hub.apply(HubCommand::Disconnect {
            connection_id: "b".into(),
        });
        assert_eq!(drain(&mut a), vec!["user_left"]);
        assert!(!hub.engine().identities().is_registered("b"));
    }

    #[tokio::test]
    async fn test_spawned_hub_tracks_sessions() {
        let (handle, task) = Hub::spawn(EngineConfig::default());
        let (outbox, mut inbox) = mpsc::unbounded_channel();

        handle.connect("a", outbox);
        handle.event("a", ClientFrame::new(ClientEvent::Ping));
        assert_eq!(inbox.recv().await.as_deref(), Some(&ServerEvent::Pong));
        assert_eq!(handle.connection_count(), 1);

        handle.disconnect("a");
        drop(handle);
        task.await.unwrap();
    }
}
