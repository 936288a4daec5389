//! History queries: backward pagination and keyword search.

use crate::message::Scope;
use crate::store::MessageStore;
use parley_protocol::MessageRecord;
use std::ops::Range;

/// Index range of page `page` (1 = newest) of a log of `len` messages.
///
/// Page `p` covers `[max(0, len - p*size), len - (p-1)*size)`. Pages past the
/// start of the log, `page < 1` and `page_size < 1` give an empty range.
#[must_use]
pub fn page_bounds(len: usize, page: i64, page_size: i64) -> Range<usize> {
    if page < 1 || page_size < 1 {
        return 0..0;
    }

    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let start = len.saturating_sub(page.saturating_mul(page_size)).max(0);
    let end = len.saturating_sub((page - 1).saturating_mul(page_size));

    if end <= start {
        return 0..0;
    }
    // Both bounds lie in 0..=len here
    start as usize..end as usize
}

/// Read-only queries over a [`MessageStore`].
#[derive(Debug, Clone, Copy)]
pub struct QueryService<'a> {
    store: &'a MessageStore,
}

impl<'a> QueryService<'a> {
    /// Create a query service over `store`.
    #[must_use]
    pub fn new(store: &'a MessageStore) -> Self {
        Self { store }
    }

    /// Page `page` of the log of `scope`, counting back from the newest
    /// message. Messages within the page are oldest first.
    #[must_use]
    pub fn paginate(&self, scope: &Scope, page: i64, page_size: i64) -> &'a [MessageRecord] {
        let log = self.store.read(scope);
        &log[page_bounds(log.len(), page, page_size)]
    }

    /// Every message of `scope` whose text or file name contains `keyword`,
    /// case-sensitively, in store order.
    #[must_use]
    pub fn search(&self, scope: &Scope, keyword: &str) -> Vec<&'a MessageRecord> {
        self.store
            .read(scope)
            .iter()
            .filter(|message| message.contains(keyword))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_protocol::UserRef;

    fn text(id: usize, body: &str) -> MessageRecord {
        MessageRecord {
            message_id: id.to_string(),
            from: UserRef::new("alice", "conn-1"),
            to: None,
            room: None,
            message: Some(body.to_string()),
            file: None,
            filename: None,
            filetype: None,
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn store_with(count: usize) -> MessageStore {
        let mut store = MessageStore::new();
        for i in 0..count {
            store.append(&Scope::Global, text(i, "msg"));
        }
        store
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(45, 1, 20), 25..45);
        assert_eq!(page_bounds(45, 2, 20), 5..25);
        assert_eq!(page_bounds(45, 3, 20), 0..5);
        assert!(page_bounds(45, 4, 20).is_empty());
        assert!(page_bounds(45, 0, 20).is_empty());
        assert!(page_bounds(45, 1, 0).is_empty());
        assert!(page_bounds(45, -2, 20).is_empty());
        assert!(page_bounds(0, 1, 20).is_empty());
        assert!(page_bounds(10, i64::MAX, i64::MAX).is_empty());
    }

    #[test]
    fn test_pages_reconstruct_log() {
        for (n, k) in [(0usize, 3i64), (1, 1), (7, 3), (9, 3), (10, 4), (25, 20)] {
            let store = store_with(n);
            let queries = QueryService::new(&store);
            let expected_pages = n.div_ceil(k as usize);

            let mut pages = Vec::new();
            for page in 1.. {
                let slice = queries.paginate(&Scope::Global, page, k);
                if slice.is_empty() {
                    break;
                }
                pages.push(slice);
            }
            assert_eq!(pages.len(), expected_pages, "n={n} k={k}");

            // Oldest page last; reversing the pages restores store order
            let rebuilt: Vec<&str> = pages
                .iter()
                .rev()
                .flat_map(|page| page.iter().map(|m| m.message_id.as_str()))
                .collect();
            let all: Vec<&str> = store
                .read(&Scope::Global)
                .iter()
                .map(|m| m.message_id.as_str())
                .collect();
            assert_eq!(rebuilt, all);
        }
    }

    #[test]
    fn test_paginate_unknown_scope() {
        let store = store_with(3);
        let queries = QueryService::new(&store);
        assert!(queries.paginate(&Scope::room("nowhere"), 1, 20).is_empty());
    }

    #[test]
    fn test_search_keyword() {
        let mut store = MessageStore::new();
        for (i, body) in ["hello world", "goodbye", "say hello"].iter().enumerate() {
            store.append(&Scope::Global, text(i, body));
        }

        let queries = QueryService::new(&store);
        let hits: Vec<&str> = queries
            .search(&Scope::Global, "hello")
            .iter()
            .map(|m| m.message.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(hits, vec!["hello world", "say hello"]);

        assert!(queries.search(&Scope::Global, "Hello").is_empty());
    }

    #[test]
    fn test_search_matches_filename() {
        let mut store = MessageStore::new();
        let scope = Scope::private("conn-1", "conn-2");
        let mut file = text(0, "");
        file.message = None;
        file.filename = Some("report.pdf".into());
        store.append(&scope, file);
        store.append(&scope, text(1, "see the report"));

        let queries = QueryService::new(&store);
        assert_eq!(queries.search(&scope, "report").len(), 2);
        assert_eq!(queries.search(&scope, ".pdf").len(), 1);
    }
}
