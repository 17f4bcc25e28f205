//! In-memory store backend for testing.

use crate::backend::{StoreBackend, WriteBatch};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tidestore_core::Document;

type Sections = BTreeMap<String, BTreeMap<String, Document>>;

/// An in-memory store backend.
///
/// This backend keeps all sections in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sections: RwLock<Sections>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of one section's rows.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn section(&self, name: &str) -> BTreeMap<String, Document> {
        self.sections
            .read()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the total number of rows across all sections.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.sections.read().values().map(BTreeMap::len).sum()
    }
}

impl StoreBackend for MemoryBackend {
    fn get(&self, section: &str, key: &str) -> StorageResult<Option<Document>> {
        Ok(self
            .sections
            .read()
            .get(section)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    fn scan(&self, section: &str) -> StorageResult<Vec<(String, Document)>> {
        Ok(self
            .sections
            .read()
            .get(section)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn apply(&self, section: &str, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut sections = self.sections.write();
        let rows = sections.entry(section.to_string()).or_default();

        if batch.clears_section() {
            rows.clear();
        }
        for key in batch.deletes() {
            rows.remove(key);
        }
        for (key, document) in batch.puts() {
            rows.insert(key.clone(), document.clone());
        }

        if rows.is_empty() {
            sections.remove(section);
        }

        Ok(())
    }

    fn sections(&self) -> StorageResult<Vec<String>> {
        Ok(self.sections.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn memory_new_is_empty() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.row_count(), 0);
        assert!(backend.sections().unwrap().is_empty());
    }

    #[test]
    fn memory_put_then_get() {
        let backend = MemoryBackend::new();

        let mut batch = WriteBatch::new();
        batch.put("k1", doc(json!({"a": 1})));
        backend.apply("s1", batch).unwrap();

        assert_eq!(backend.get("s1", "k1").unwrap(), Some(doc(json!({"a": 1}))));
        assert_eq!(backend.get("s1", "missing").unwrap(), None);
        assert_eq!(backend.get("other", "k1").unwrap(), None);
    }

    #[test]
    fn memory_scan_returns_all_rows() {
        let backend = MemoryBackend::new();

        let mut batch = WriteBatch::new();
        batch.put("k1", doc(json!({"a": 1})));
        batch.put("k2", doc(json!({"a": 2})));
        backend.apply("s1", batch).unwrap();

        let rows = backend.scan("s1").unwrap();
        assert_eq!(rows.len(), 2);

        assert!(backend.scan("unknown").unwrap().is_empty());
    }

    #[test]
    fn memory_delete_and_clear() {
        let backend = MemoryBackend::new();

        let mut batch = WriteBatch::new();
        batch.put("k1", doc(json!({"a": 1})));
        batch.put("k2", doc(json!({"a": 2})));
        backend.apply("s1", batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.delete("k1");
        backend.apply("s1", batch).unwrap();
        assert_eq!(backend.row_count(), 1);

        let mut batch = WriteBatch::new();
        batch.clear_section();
        backend.apply("s1", batch).unwrap();
        assert_eq!(backend.row_count(), 0);
        assert!(backend.sections().unwrap().is_empty());
    }

    #[test]
    fn memory_put_overwrites() {
        let backend = MemoryBackend::new();

        let mut batch = WriteBatch::new();
        batch.put("k1", doc(json!({"a": 1})));
        backend.apply("s1", batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.put("k1", doc(json!({"a": 2})));
        backend.apply("s1", batch).unwrap();

        assert_eq!(backend.get("s1", "k1").unwrap(), Some(doc(json!({"a": 2}))));
        assert_eq!(backend.row_count(), 1);
    }

    #[test]
    fn memory_sections_are_disjoint() {
        let backend = MemoryBackend::new();

        let mut batch = WriteBatch::new();
        batch.put("k1", doc(json!({"a": 1})));
        backend.apply("cache:books", batch).unwrap();

        let mut batch = WriteBatch::new();
        batch.put("k1", doc(json!({"b": 2})));
        backend.apply("queue:books", batch).unwrap();

        assert_eq!(
            backend.sections().unwrap(),
            vec!["cache:books".to_string(), "queue:books".to_string()]
        );
        assert_eq!(
            backend.get("cache:books", "k1").unwrap(),
            Some(doc(json!({"a": 1})))
        );
    }
}
