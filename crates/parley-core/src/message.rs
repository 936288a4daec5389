//! Message scopes, scope keys and server-side stamping.
//!
//! Every stored message belongs to exactly one scope. The scope selects the
//! history log and, through its key, the unread counters.

use chrono::{DateTime, SecondsFormat, Utc};
use parley_protocol::ScopeSelector;

/// Key of the global log.
pub const GLOBAL_SCOPE_KEY: &str = "global";

/// Separator between the two connection ids of a private pair key.
pub const PAIR_SEPARATOR: char = '_';

/// Build the private pair key for two connections.
///
/// The ids are sorted first, so both participants get the same key.
#[must_use]
pub fn private_key(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut key = String::with_capacity(low.len() + high.len() + 1);
    key.push_str(low);
    key.push(PAIR_SEPARATOR);
    key.push_str(high);
    key
}

/// The kind of a scope, without its instance data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    Room,
    Private,
}

impl ScopeKind {
    /// Lowercase name, as used in query selectors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::Room => "room",
            ScopeKind::Private => "private",
        }
    }
}

/// Identifies one history log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The broadcast log.
    Global,
    /// A room log, by room name.
    Room(String),
    /// A private log, by pair key.
    Private(String),
}

impl Scope {
    /// Room scope.
    #[must_use]
    pub fn room(name: impl Into<String>) -> Self {
        Scope::Room(name.into())
    }

    /// Private scope between two connections, in either order.
    #[must_use]
    pub fn private(a: &str, b: &str) -> Self {
        Scope::Private(private_key(a, b))
    }

    /// Resolve a query selector from the point of view of `requester`.
    ///
    /// Returns `None` for unknown kinds or when the addressing field the kind
    /// needs is missing.
    #[must_use]
    pub fn from_selector(selector: &ScopeSelector, requester: &str) -> Option<Self> {
        match selector.kind.as_str() {
            "global" => Some(Scope::Global),
            "room" => selector.room.as_deref().map(Scope::room),
            "private" => selector
                .to
                .as_deref()
                .map(|to| Scope::private(requester, to)),
            _ => None,
        }
    }

    /// The scope key: `global`, the room name, or the pair key.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Scope::Global => GLOBAL_SCOPE_KEY,
            Scope::Room(name) => name,
            Scope::Private(key) => key,
        }
    }

    /// The kind of this scope.
    #[must_use]
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Global => ScopeKind::Global,
            Scope::Room(_) => ScopeKind::Room,
            Scope::Private(_) => ScopeKind::Private,
        }
    }
}

/// Format a time the way clients expect: ISO-8601, milliseconds, `Z`.
#[must_use]
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generates message ids of the form `<connection>_<unix-millis>-<seq>`.
///
/// `seq` increases for every id the generator hands out, so two messages
/// from one connection within the same millisecond still get distinct ids.
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    next: u64,
}

impl MessageIdGenerator {
    /// Create a new generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the id for a message from `connection_id` received at `at`.
    pub fn generate(&mut self, connection_id: &str, at: DateTime<Utc>) -> String {
        self.next += 1;
        format!(
            "{}{}{}-{}",
            connection_id,
            PAIR_SEPARATOR,
            at.timestamp_millis(),
            self.next
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_private_key_symmetric() {
        let pairs = [("conn_a", "conn_b"), ("x", "x"), ("", "z"), ("b9", "b10")];
        for (a, b) in pairs {
            assert_eq!(private_key(a, b), private_key(b, a));
        }
        assert_eq!(private_key("bob", "alice"), "alice_bob");
    }

    #[test]
    fn test_scope_keys() {
        assert_eq!(Scope::Global.key(), "global");
        assert_eq!(Scope::room("lobby").key(), "lobby");
        assert_eq!(Scope::private("b", "a").key(), "a_b");
        assert_eq!(Scope::private("b", "a"), Scope::private("a", "b"));
    }

    #[test]
    fn test_scope_from_selector() {
        assert_eq!(
            Scope::from_selector(&ScopeSelector::global(), "me"),
            Some(Scope::Global)
        );
        assert_eq!(
            Scope::from_selector(&ScopeSelector::room("lobby"), "me"),
            Some(Scope::room("lobby"))
        );
        assert_eq!(
            Scope::from_selector(&ScopeSelector::private("you"), "me"),
            Some(Scope::private("me", "you"))
        );

        let missing_room = ScopeSelector {
            kind: "room".into(),
            ..ScopeSelector::default()
        };
        assert_eq!(Scope::from_selector(&missing_room, "me"), None);

        let unknown = ScopeSelector {
            kind: "galaxy".into(),
            ..ScopeSelector::default()
        };
        assert_eq!(Scope::from_selector(&unknown, "me"), None);
    }

    #[test]
    fn test_iso_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(iso_timestamp(at), "2024-03-09T14:05:07.000Z");
    }

    #[test]
    fn test_message_ids_unique_within_millisecond() {
        let mut ids = MessageIdGenerator::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        let first = ids.generate("conn_1", at);
        let second = ids.generate("conn_1", at);

        assert_ne!(first, second);
        assert!(first.starts_with("conn_1_1700000000000-"));
    }
}
