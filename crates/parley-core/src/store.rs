//! In-memory message history.
//!
//! One append-only log per scope. Insertion order is delivery order is
//! retrieval order; logs never shrink.

use crate::message::Scope;
use parley_protocol::MessageRecord;
use std::collections::HashMap;
use tracing::trace;

/// Append-only message logs for every scope.
#[derive(Debug, Default)]
pub struct MessageStore {
    global: Vec<MessageRecord>,
    rooms: HashMap<String, Vec<MessageRecord>>,
    privates: HashMap<String, Vec<MessageRecord>>,
}

impl MessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the log of `scope`, creating the log if needed.
    pub fn append(&mut self, scope: &Scope, message: MessageRecord) {
        let log = match scope {
            Scope::Global => &mut self.global,
            Scope::Room(name) => self.rooms.entry(name.clone()).or_default(),
            Scope::Private(key) => self.privates.entry(key.clone()).or_default(),
        };
        log.push(message);
        trace!(scope = %scope.key(), len = log.len(), "Appended message");
    }

    /// The full log of `scope`, oldest first. Empty for unknown scopes.
    #[must_use]
    pub fn read(&self, scope: &Scope) -> &[MessageRecord] {
        let log = match scope {
            Scope::Global => Some(&self.global),
            Scope::Room(name) => self.rooms.get(name),
            Scope::Private(key) => self.privates.get(key),
        };
        log.map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of messages in the log of `scope`.
    #[must_use]
    pub fn len(&self, scope: &Scope) -> usize {
        self.read(scope).len()
    }

    /// Store statistics.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let room_messages: usize = self.rooms.values().map(Vec::len).sum();
        let private_messages: usize = self.privates.values().map(Vec::len).sum();
        StoreStats {
            room_logs: self.rooms.len(),
            private_logs: self.privates.len(),
            total_messages: self.global.len() + room_messages + private_messages,
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of room logs.
    pub room_logs: usize,
    /// Number of private logs.
    pub private_logs: usize,
    /// Messages across all logs.
    pub total_messages: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::UserRef;

    fn record(id: &str, text: &str) -> MessageRecord {
        MessageRecord {
            message_id: id.to_string(),
            from: UserRef::new("alice", "conn-1"),
            to: None,
            room: None,
            message: Some(text.to_string()),
            file: None,
            filename: None,
            filetype: None,
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = MessageStore::new();
        for i in 0..5 {
            store.append(&Scope::Global, record(&i.to_string(), "hi"));
        }

        let ids: Vec<&str> = store
            .read(&Scope::Global)
            .iter()
            .map(|m| m.message_id.as_str())
            .collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);
    }

    #[test]
    fn test_scopes_are_separate() {
        let mut store = MessageStore::new();
        store.append(&Scope::room("lobby"), record("r1", "room"));
        store.append(&Scope::private("b", "a"), record("p1", "private"));

        assert_eq!(store.len(&Scope::Global), 0);
        assert_eq!(store.len(&Scope::room("lobby")), 1);
        assert_eq!(store.len(&Scope::private("a", "b")), 1);
        // A room named like a pair key is a different log
        assert_eq!(store.len(&Scope::room("a_b")), 0);
    }

    #[test]
    fn test_unknown_scope_is_empty() {
        let store = MessageStore::new();
        assert!(store.read(&Scope::room("nowhere")).is_empty());
    }

    #[test]
    fn test_stats() {
        let mut store = MessageStore::new();
        store.append(&Scope::Global, record("g1", "a"));
        store.append(&Scope::room("x"), record("r1", "b"));
        store.append(&Scope::room("y"), record("r2", "c"));
        store.append(&Scope::private("a", "b"), record("p1", "d"));

        let stats = store.stats();
        assert_eq!(stats.room_logs, 2);
        assert_eq!(stats.private_logs, 1);
        assert_eq!(stats.total_messages, 4);
    }
}
