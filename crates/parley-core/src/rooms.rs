//! Room membership for Parley.
//!
//! Rooms are named groups of connections. A room exists from the first join
//! on and is never removed, even once empty, so its history stays reachable.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

static NO_MEMBERS: BTreeSet<String> = BTreeSet::new();

/// Tracks which connections belong to which rooms.
#[derive(Debug, Default)]
pub struct RoomMembership {
    /// Room name -> member connection ids.
    rooms: HashMap<String, BTreeSet<String>>,
    /// Connection id -> joined room names.
    joined: HashMap<String, BTreeSet<String>>,
}

impl RoomMembership {
    /// Create an empty membership table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Any string names a room, the empty one included. Returns `true` if
    /// the connection was not a member yet.
    pub fn join(&mut self, connection_id: &str, room: &str) -> bool {
        let members = self.rooms.entry(room.to_string()).or_insert_with(|| {
            debug!(room = %room, "Creating new room");
            BTreeSet::new()
        });
        let added = members.insert(connection_id.to_string());

        self.joined
            .entry(connection_id.to_string())
            .or_default()
            .insert(room.to_string());

        debug!(
            room = %room,
            connection = %connection_id,
            members = members.len(),
            "Joined room"
        );
        added
    }

    /// Remove a connection from a room.
    ///
    /// Returns `true` if the connection was a member.
    pub fn leave(&mut self, connection_id: &str, room: &str) -> bool {
        let removed = self
            .rooms
            .get_mut(room)
            .is_some_and(|members| members.remove(connection_id));

        if let Some(rooms) = self.joined.get_mut(connection_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.joined.remove(connection_id);
            }
        }

        if removed {
            debug!(room = %room, connection = %connection_id, "Left room");
        }
        removed
    }

    /// Members of a room; empty for unknown rooms.
    #[must_use]
    pub fn members(&self, room: &str) -> &BTreeSet<String> {
        self.rooms.get(room).unwrap_or(&NO_MEMBERS)
    }

    /// Check if a connection is in a room.
    #[must_use]
    pub fn is_member(&self, connection_id: &str, room: &str) -> bool {
        self.members(room).contains(connection_id)
    }

    /// Check if a room has ever been joined.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Number of known rooms, empty ones included.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Rooms a connection currently belongs to.
    #[must_use]
    pub fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        self.joined
            .get(connection_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a connection from every room it belongs to.
    ///
    /// Rooms stay known even if this empties them. Returns the rooms left.
    pub fn forget(&mut self, connection_id: &str) -> Vec<String> {
        let Some(rooms) = self.joined.remove(connection_id) else {
            return Vec::new();
        };

        for room in &rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(connection_id);
            }
        }

        debug!(connection = %connection_id, rooms = rooms.len(), "Left all rooms");
        rooms.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_leave() {
        let mut rooms = RoomMembership::new();

        assert!(rooms.join("conn-1", "lobby"));
        assert!(!rooms.join("conn-1", "lobby"));
        assert!(rooms.is_member("conn-1", "lobby"));

        assert!(rooms.leave("conn-1", "lobby"));
        assert!(!rooms.is_member("conn-1", "lobby"));
        assert!(!rooms.leave("conn-1", "lobby"));

        // The room outlives its last member
        assert!(rooms.room_exists("lobby"));
        assert!(rooms.members("lobby").is_empty());
    }

    #[test]
    fn test_leave_after_any_join_sequence() {
        let mut rooms = RoomMembership::new();
        let sequences: [&[&str]; 3] = [&["a"], &["a", "b", "a"], &["b", "c", "a", "a"]];

        for sequence in sequences {
            for conn in sequence {
                rooms.join(conn, "r");
            }
            rooms.leave("a", "r");
            assert!(!rooms.members("r").contains("a"));
        }
    }

    #[test]
    fn test_unknown_room_has_no_members() {
        let rooms = RoomMembership::new();
        assert!(rooms.members("nowhere").is_empty());
        assert!(!rooms.room_exists("nowhere"));
    }

    #[test]
    fn test_members_sorted() {
        let mut rooms = RoomMembership::new();
        rooms.join("conn-c", "lobby");
        rooms.join("conn-a", "lobby");
        rooms.join("conn-b", "lobby");

        let members: Vec<&str> = rooms.members("lobby").iter().map(String::as_str).collect();
        assert_eq!(members, vec!["conn-a", "conn-b", "conn-c"]);
    }

    #[test]
    fn test_any_room_name_accepted() {
        let mut rooms = RoomMembership::new();
        let long_name = "r".repeat(1024);

        for name in ["", "general chat", long_name.as_str()] {
            assert!(rooms.join("conn-1", name));
            assert!(rooms.is_member("conn-1", name));
        }
        assert!(rooms.leave("conn-1", ""));
        assert_eq!(rooms.room_count(), 3);
    }

    #[test]
    fn test_forget() {
        let mut rooms = RoomMembership::new();
        rooms.join("conn-1", "a");
        rooms.join("conn-1", "b");
        rooms.join("conn-2", "b");

        assert_eq!(rooms.rooms_of("conn-1"), vec!["a", "b"]);
        assert_eq!(rooms.forget("conn-1"), vec!["a", "b"]);

        assert!(rooms.rooms_of("conn-1").is_empty());
        assert!(rooms.members("a").is_empty());
        assert_eq!(rooms.members("b").len(), 1);
        assert_eq!(rooms.room_count(), 2);
        assert!(rooms.forget("conn-1").is_empty());
    }
}
