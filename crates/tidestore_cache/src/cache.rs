//! Local record cache.

use crate::backend::{StoreBackend, WriteBatch};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tidestore_core::{Document, EntityId, Query, Record};

/// A typed record cache over a [`StoreBackend`].
///
/// Records are persisted one section per collection, keyed by entity id.
/// All access to one cache instance is serialized, so readers never
/// observe a torn write and two mutations never interleave. Mutations
/// are durable before the call returns.
pub struct LocalCache {
    backend: Arc<dyn StoreBackend>,
    guard: Mutex<()>,
}

impl LocalCache {
    /// Creates a cache over the given backend.
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            guard: Mutex::new(()),
        }
    }

    /// Upserts a record by entity id.
    ///
    /// A record without an id is assigned a temporary id first. Returns
    /// the stored record, id included.
    pub fn save(&self, collection: &str, mut record: Record) -> StorageResult<Record> {
        let _serialized = self.guard.lock();

        let id = record
            .id
            .get_or_insert_with(EntityId::temporary)
            .clone();

        let mut batch = WriteBatch::new();
        batch.put(id.as_str(), encode_record(&record)?);
        self.backend.apply(&section(collection), batch)?;
        Ok(record)
    }

    /// Returns records matching the query, ordered per its sort.
    pub fn find(&self, collection: &str, query: &Query) -> StorageResult<Vec<Record>> {
        let _serialized = self.guard.lock();
        Ok(query.apply(self.load_records(collection)?))
    }

    /// Returns a record by entity id.
    pub fn find_by_id(&self, collection: &str, id: &EntityId) -> StorageResult<Option<Record>> {
        let _serialized = self.guard.lock();
        self.backend
            .get(&section(collection), id.as_str())?
            .map(decode_record)
            .transpose()
    }

    /// Projects the query scope to an id → last-modified-time mapping.
    ///
    /// Used exclusively for delta computation; full records are never
    /// handed to the caller. A record the server has not stamped yet
    /// projects to the empty string, so any remote value reads as a
    /// difference.
    pub fn ids_lmts(
        &self,
        collection: &str,
        query: &Query,
    ) -> StorageResult<BTreeMap<String, String>> {
        let _serialized = self.guard.lock();
        let records = query.apply(self.load_records(collection)?);

        let mut snapshot = BTreeMap::new();
        for record in records {
            if let Some(id) = record.id.as_ref() {
                let lmt = record.last_modified_time().unwrap_or_default().to_string();
                snapshot.insert(id.to_string(), lmt);
            }
        }
        Ok(snapshot)
    }

    /// Deletes records matching the query; returns the count removed.
    pub fn remove(&self, collection: &str, query: &Query) -> StorageResult<u64> {
        let _serialized = self.guard.lock();
        let matched = query.apply(self.load_records(collection)?);

        let mut batch = WriteBatch::new();
        let mut removed = 0u64;
        for record in &matched {
            if let Some(id) = record.id.as_ref() {
                batch.delete(id.as_str());
                removed += 1;
            }
        }
        if !batch.is_empty() {
            self.backend.apply(&section(collection), batch)?;
        }
        Ok(removed)
    }

    /// Deletes one record by entity id; returns the count removed (0 or 1).
    pub fn remove_by_id(&self, collection: &str, id: &EntityId) -> StorageResult<u64> {
        let _serialized = self.guard.lock();
        if self.backend.get(&section(collection), id.as_str())?.is_none() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        batch.delete(id.as_str());
        self.backend.apply(&section(collection), batch)?;
        Ok(1)
    }

    /// Counts records matching the query.
    pub fn count(&self, collection: &str, query: &Query) -> StorageResult<u64> {
        let _serialized = self.guard.lock();
        Ok(query.apply(self.load_records(collection)?).len() as u64)
    }

    /// Removes every cached record of a collection.
    pub fn clear(&self, collection: &str) -> StorageResult<()> {
        let _serialized = self.guard.lock();
        let mut batch = WriteBatch::new();
        batch.clear_section();
        self.backend.apply(&section(collection), batch)
    }

    fn load_records(&self, collection: &str) -> StorageResult<Vec<Record>> {
        self.backend
            .scan(&section(collection))?
            .into_iter()
            .map(|(_, document)| decode_record(document))
            .collect()
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache").finish_non_exhaustive()
    }
}

fn section(collection: &str) -> String {
    format!("cache:{collection}")
}

fn encode_record(record: &Record) -> StorageResult<Document> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(StorageError::corrupted("record must encode to an object")),
    }
}

fn decode_record(document: Document) -> StorageResult<Record> {
    Ok(serde_json::from_value(serde_json::Value::Object(document))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use serde_json::json;
    use tidestore_core::Filter;

    fn cache() -> LocalCache {
        LocalCache::new(Arc::new(MemoryBackend::new()))
    }

    fn record(id: &str, age: i64) -> Record {
        let mut r = Record::with_id(id);
        r.set("age", age);
        r
    }

    #[test]
    fn save_assigns_temporary_id() {
        let cache = cache();
        let mut r = Record::new();
        r.set("title", "draft");

        let saved = cache.save("notes", r).unwrap();
        let id = saved.id.clone().unwrap();
        assert!(id.is_temporary());

        let found = cache.find_by_id("notes", &id).unwrap().unwrap();
        assert_eq!(found.get("title"), Some(&json!("draft")));
    }

    #[test]
    fn save_upserts_by_id() {
        let cache = cache();
        cache.save("notes", record("r1", 1)).unwrap();
        cache.save("notes", record("r1", 2)).unwrap();

        assert_eq!(cache.count("notes", &Query::new()).unwrap(), 1);
        let found = cache
            .find_by_id("notes", &EntityId::new("r1"))
            .unwrap()
            .unwrap();
        assert_eq!(found.get("age"), Some(&json!(2)));
    }

    #[test]
    fn find_applies_query() {
        let cache = cache();
        cache.save("notes", record("r1", 10)).unwrap();
        cache.save("notes", record("r2", 20)).unwrap();
        cache.save("notes", record("r3", 30)).unwrap();

        let query = Query::filtered(Filter::Gt("age".into(), json!(15))).sort_desc("age");
        let found = cache.find("notes", &query).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id.as_ref().unwrap().as_str(), "r3");
    }

    #[test]
    fn ids_lmts_projects_lmt_or_empty() {
        let cache = cache();

        let mut synced = record("r1", 1);
        synced.metadata.last_modified_time = Some("v1".into());
        cache.save("notes", synced).unwrap();
        cache.save("notes", record("r2", 2)).unwrap();

        let snapshot = cache.ids_lmts("notes", &Query::new()).unwrap();
        assert_eq!(snapshot.get("r1"), Some(&"v1".to_string()));
        assert_eq!(snapshot.get("r2"), Some(&String::new()));
    }

    #[test]
    fn remove_returns_count() {
        let cache = cache();
        cache.save("notes", record("r1", 10)).unwrap();
        cache.save("notes", record("r2", 20)).unwrap();

        let query = Query::filtered(Filter::Gt("age".into(), json!(15)));
        assert_eq!(cache.remove("notes", &query).unwrap(), 1);
        assert_eq!(cache.count("notes", &Query::new()).unwrap(), 1);

        assert_eq!(
            cache.remove_by_id("notes", &EntityId::new("r1")).unwrap(),
            1
        );
        assert_eq!(
            cache.remove_by_id("notes", &EntityId::new("r1")).unwrap(),
            0
        );
    }

    #[test]
    fn clear_empties_one_collection() {
        let cache = cache();
        cache.save("notes", record("r1", 1)).unwrap();
        cache.save("books", record("b1", 1)).unwrap();

        cache.clear("notes").unwrap();
        assert_eq!(cache.count("notes", &Query::new()).unwrap(), 0);
        assert_eq!(cache.count("books", &Query::new()).unwrap(), 1);
    }

    #[test]
    fn collections_are_disjoint() {
        let cache = cache();
        cache.save("notes", record("r1", 1)).unwrap();

        assert!(cache
            .find_by_id("books", &EntityId::new("r1"))
            .unwrap()
            .is_none());
    }
}
