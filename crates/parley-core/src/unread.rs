//! Per-recipient unread counters, keyed by scope key.

use std::collections::HashMap;

/// Unread counters: recipient connection id -> scope key -> count.
#[derive(Debug, Default)]
pub struct UnreadTracker {
    counts: HashMap<String, HashMap<String, u64>>,
}

impl UnreadTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unread message for `recipient` under `key`. Returns the new count.
    pub fn increment(&mut self, recipient: &str, key: &str) -> u64 {
        let count = self
            .counts
            .entry(recipient.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert(0);
        *count += 1;
        *count
    }

    /// Reset the counter for `recipient` under `key` to zero.
    pub fn clear(&mut self, recipient: &str, key: &str) {
        self.counts
            .entry(recipient.to_string())
            .or_default()
            .insert(key.to_string(), 0);
    }

    /// Current count; 0 for unknown recipients or keys.
    #[must_use]
    pub fn get(&self, recipient: &str, key: &str) -> u64 {
        self.counts
            .get(recipient)
            .and_then(|keys| keys.get(key))
            .copied()
            .unwrap_or(0)
    }

    /// Drop every counter of a recipient. Returns `true` if any existed.
    pub fn forget(&mut self, recipient: &str) -> bool {
        self.counts.remove(recipient).is_some()
    }

    /// Number of recipients with at least one counter.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_get() {
        let mut unread = UnreadTracker::new();
        assert_eq!(unread.get("conn-1", "lobby"), 0);

        assert_eq!(unread.increment("conn-1", "lobby"), 1);
        assert_eq!(unread.increment("conn-1", "lobby"), 2);
        assert_eq!(unread.get("conn-1", "lobby"), 2);
        assert_eq!(unread.get("conn-1", "other"), 0);
        assert_eq!(unread.get("conn-2", "lobby"), 0);
    }

    #[test]
    fn test_clear_then_get_is_zero() {
        let mut unread = UnreadTracker::new();
        unread.increment("conn-1", "lobby");
        unread.clear("conn-1", "lobby");
        assert_eq!(unread.get("conn-1", "lobby"), 0);

        // Clearing without prior state is fine
        unread.clear("conn-9", "never");
        assert_eq!(unread.get("conn-9", "never"), 0);
    }

    #[test]
    fn test_forget() {
        let mut unread = UnreadTracker::new();
        unread.increment("conn-1", "a");
        unread.increment("conn-2", "a");

        assert!(unread.forget("conn-1"));
        assert!(!unread.forget("conn-1"));
        assert_eq!(unread.get("conn-1", "a"), 0);
        assert_eq!(unread.recipient_count(), 1);
    }
}
