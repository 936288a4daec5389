//! Identity registry for Parley.
//!
//! Binds live connections to display names. A connection without a binding
//! is shown to others as [`ANONYMOUS`].

use parley_protocol::UserRef;
use std::collections::HashMap;
use tracing::debug;

/// Display name used for connections that never registered.
pub const ANONYMOUS: &str = "Anonymous";

/// A registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Connection id.
    pub connection_id: String,
    /// Display name chosen by the client.
    pub display_name: String,
    /// Position in the roster.
    order: u64,
}

impl Identity {
    /// This identity as seen by other users.
    #[must_use]
    pub fn user_ref(&self) -> UserRef {
        UserRef::new(self.display_name.clone(), self.connection_id.clone())
    }
}

/// Connection id to display name mapping.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    members: HashMap<String, Identity>,
    next_order: u64,
}

impl IdentityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether no connection is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether a connection has a binding.
    #[must_use]
    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.members.contains_key(connection_id)
    }

    /// Get the identity bound to a connection.
    #[must_use]
    pub fn get(&self, connection_id: &str) -> Option<&Identity> {
        self.members.get(connection_id)
    }

    /// Bind a display name to a connection.
    ///
    /// Re-registering overwrites the name but keeps the roster position.
    /// Returns `true` if the connection was not registered before.
    pub fn register(&mut self, connection_id: &str, display_name: impl Into<String>) -> bool {
        let display_name = display_name.into();

        if let Some(existing) = self.members.get_mut(connection_id) {
            debug!(
                connection = %connection_id,
                from = %existing.display_name,
                to = %display_name,
                "Identity renamed"
            );
            existing.display_name = display_name;
            return false;
        }

        self.next_order += 1;
        debug!(connection = %connection_id, name = %display_name, "Identity registered");
        self.members.insert(
            connection_id.to_string(),
            Identity {
                connection_id: connection_id.to_string(),
                display_name,
                order: self.next_order,
            },
        );
        true
    }

    /// Display name for a connection, or [`ANONYMOUS`].
    #[must_use]
    pub fn resolve(&self, connection_id: &str) -> &str {
        self.members
            .get(connection_id)
            .map_or(ANONYMOUS, |identity| identity.display_name.as_str())
    }

    /// Resolved display name plus connection id.
    #[must_use]
    pub fn user_ref(&self, connection_id: &str) -> UserRef {
        UserRef::new(self.resolve(connection_id), connection_id)
    }

    /// Remove a binding, returning it if there was one.
    pub fn unregister(&mut self, connection_id: &str) -> Option<Identity> {
        let removed = self.members.remove(connection_id);
        if removed.is_some() {
            debug!(connection = %connection_id, "Identity unregistered");
        }
        removed
    }

    /// Display names of all registered connections, in registration order.
    #[must_use]
    pub fn roster(&self) -> Vec<String> {
        let mut identities: Vec<&Identity> = self.members.values().collect();
        identities.sort_by_key(|identity| identity.order);
        identities
            .into_iter()
            .map(|identity| identity.display_name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unbound_is_anonymous() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.resolve("conn-1"), ANONYMOUS);
        assert_eq!(registry.user_ref("conn-1"), UserRef::new("Anonymous", "conn-1"));
    }

    #[test]
    fn test_register_and_overwrite() {
        let mut registry = IdentityRegistry::new();

        assert!(registry.register("conn-1", "alice"));
        assert!(registry.register("conn-2", "bob"));
        assert!(!registry.register("conn-1", "alicia"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.resolve("conn-1"), "alicia");
        assert_eq!(registry.roster(), vec!["alicia", "bob"]);
    }

    #[test]
    fn test_unregister() {
        let mut registry = IdentityRegistry::new();
        registry.register("conn-1", "alice");

        let removed = registry.unregister("conn-1").unwrap();
        assert_eq!(removed.display_name, "alice");
        assert_eq!(removed.user_ref(), UserRef::new("alice", "conn-1"));
        assert!(!registry.is_registered("conn-1"));

        // Unbound connections are a no-op
        assert!(registry.unregister("conn-1").is_none());
        assert!(registry.is_empty());
    }
}
