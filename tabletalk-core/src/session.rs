//! Session-scoped state: the remembered base query for pagination and the
//! cached last result set for the export collaborator.
//!
//! The store is an explicit dependency injected into the core, keyed by a
//! caller identity. Nothing is shared across sessions.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;

/// What a later "next page" request needs to re-slice the last accepted read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationContext {
    /// Base query with no trailing LIMIT/OFFSET/semicolon
    pub base_sql: String,
    pub page_size: usize,
}

/// Per-session key-value state consumed and produced by the core
pub trait SessionStore: Send + Sync {
    /// Remember the base query of an accepted read, replacing any previous one
    fn remember_read(&self, session_id: &str, base_sql: String, page_size: usize);

    /// Recall the last accepted read; `None` means nothing to paginate
    fn recall(&self, session_id: &str) -> Option<PaginationContext>;

    /// Cache the rows of the last read for re-use without re-querying
    fn cache_result(&self, session_id: &str, rows: Vec<Map<String, Value>>);

    /// The cached rows of the last read, if any
    fn cached_result(&self, session_id: &str) -> Option<Vec<Map<String, Value>>>;
}

#[derive(Debug, Default)]
struct SessionData {
    last_base_sql: Option<String>,
    last_page_size: Option<usize>,
    last_result: Option<Vec<Map<String, Value>>>,
}

/// In-memory store; a single session is only ever accessed sequentially, the
/// mutex covers concurrent distinct sessions
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<HashMap<String, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn remember_read(&self, session_id: &str, base_sql: String, page_size: usize) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let data = inner.entry(session_id.to_string()).or_default();
        data.last_base_sql = Some(base_sql);
        data.last_page_size = Some(page_size);
    }

    fn recall(&self, session_id: &str) -> Option<PaginationContext> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let data = inner.get(session_id)?;
        Some(PaginationContext {
            base_sql: data.last_base_sql.clone()?,
            page_size: data.last_page_size?,
        })
    }

    fn cache_result(&self, session_id: &str, rows: Vec<Map<String, Value>>) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entry(session_id.to_string()).or_default().last_result = Some(rows);
    }

    fn cached_result(&self, session_id: &str) -> Option<Vec<Map<String, Value>>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(session_id)?.last_result.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recall_is_none_before_any_read() {
        let store = MemorySessionStore::new();
        assert_eq!(store.recall("s1"), None);
    }

    #[test]
    fn test_remember_and_recall() {
        let store = MemorySessionStore::new();
        store.remember_read("s1", "SELECT * FROM products".to_string(), 50);
        assert_eq!(
            store.recall("s1"),
            Some(PaginationContext {
                base_sql: "SELECT * FROM products".to_string(),
                page_size: 50,
            })
        );
    }

    #[test]
    fn test_next_read_overwrites_previous() {
        let store = MemorySessionStore::new();
        store.remember_read("s1", "SELECT * FROM products".to_string(), 50);
        store.remember_read("s1", "SELECT * FROM sales".to_string(), 25);
        let ctx = store.recall("s1").unwrap();
        assert_eq!(ctx.base_sql, "SELECT * FROM sales");
        assert_eq!(ctx.page_size, 25);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = MemorySessionStore::new();
        store.remember_read("s1", "SELECT * FROM products".to_string(), 50);
        assert_eq!(store.recall("s2"), None);
    }

    #[test]
    fn test_cached_result_round_trip() {
        let store = MemorySessionStore::new();
        assert!(store.cached_result("s1").is_none());

        let mut row = Map::new();
        row.insert("name".to_string(), serde_json::json!("Widget"));
        store.cache_result("s1", vec![row]);

        let cached = store.cached_result("s1").unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].get("name"), Some(&serde_json::json!("Widget")));
    }
}
