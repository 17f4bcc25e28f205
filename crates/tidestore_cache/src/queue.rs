//! Pending-operation queue (the sync queue).

use crate::backend::{StoreBackend, WriteBatch};
use crate::error::StorageResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tidestore_core::{Document, EntityId};
use uuid::Uuid;

/// The kind of mutation a pending operation replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationMethod {
    /// Entity creation (HTTP POST).
    Create,
    /// Entity update (HTTP PUT).
    Update,
    /// Entity or collection-wide deletion (HTTP DELETE).
    Delete,
}

impl OperationMethod {
    /// Derives the method from an HTTP verb.
    #[must_use]
    pub fn from_http(verb: &str) -> Option<Self> {
        match verb.to_ascii_uppercase().as_str() {
            "POST" => Some(Self::Create),
            "PUT" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Returns the HTTP verb this method replays as.
    #[must_use]
    pub fn as_http(self) -> &'static str {
        match self {
            Self::Create => "POST",
            Self::Update => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A not-yet-acknowledged mutation captured for later replay.
///
/// `payload` holds whatever is needed to rebuild the network call: the
/// encoded record for Create/Update, the encoded query for a
/// collection-wide Delete, nothing for a by-id Delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Collection the mutation targets.
    pub collection: String,
    /// Entity id, or `None` for a collection-wide delete.
    pub object_id: Option<EntityId>,
    /// Mutation kind.
    pub method: OperationMethod,
    /// Replayable request body.
    pub payload: Option<Document>,
    /// Storage key: the entity id, or a generated key for id-less entries.
    key: String,
}

impl PendingOperation {
    /// Creates a pending operation.
    pub fn new(
        collection: impl Into<String>,
        object_id: Option<EntityId>,
        method: OperationMethod,
        payload: Option<Document>,
    ) -> Self {
        let key = object_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| format!("op-{}", Uuid::new_v4()));
        Self {
            collection: collection.into(),
            object_id,
            method,
            payload,
            key,
        }
    }

    /// Creates a pending operation from a captured HTTP request.
    ///
    /// Returns `None` for verbs that never enqueue (reads).
    pub fn from_request(
        collection: impl Into<String>,
        verb: &str,
        object_id: Option<EntityId>,
        payload: Option<Document>,
    ) -> Option<Self> {
        let method = OperationMethod::from_http(verb)?;
        Some(Self::new(collection, object_id, method, payload))
    }

    /// Returns the storage key of this entry.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// The pending-operation log for a local store.
///
/// One section per collection. The queue enforces the at-most-one-entry
/// invariant per (collection, object id): entries are keyed by entity
/// id, so a later write replaces the earlier entry and only the latest
/// intended network call survives (last-intent-wins). Queue growth is
/// therefore bounded by the number of distinct dirty entities, not by
/// edit frequency. Collection-wide delete entries have no id and each
/// stand alone.
pub struct SyncQueue {
    backend: Arc<dyn StoreBackend>,
    guard: Mutex<()>,
}

impl SyncQueue {
    /// Creates a queue over the given backend.
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            guard: Mutex::new(()),
        }
    }

    /// Coalescing insert.
    ///
    /// Any existing entry with the same (collection, object id) is
    /// replaced; intermediate states are never sent to the server.
    pub fn save(&self, operation: &PendingOperation) -> StorageResult<()> {
        let _serialized = self.guard.lock();
        let mut batch = WriteBatch::new();
        batch.put(operation.key(), encode_operation(operation)?);
        self.backend.apply(&section(&operation.collection), batch)
    }

    /// Returns every pending entry for a collection.
    ///
    /// Order is not significant; consumers may replay entries
    /// concurrently.
    pub fn pending(&self, collection: &str) -> StorageResult<Vec<PendingOperation>> {
        let _serialized = self.guard.lock();
        self.backend
            .scan(&section(collection))?
            .into_iter()
            .map(|(_, document)| decode_operation(document))
            .collect()
    }

    /// Returns the pending entry for one entity, if any.
    pub fn pending_for(
        &self,
        collection: &str,
        id: &EntityId,
    ) -> StorageResult<Option<PendingOperation>> {
        let _serialized = self.guard.lock();
        self.backend
            .get(&section(collection), id.as_str())?
            .map(decode_operation)
            .transpose()
    }

    /// Removes one entry.
    pub fn remove(&self, operation: &PendingOperation) -> StorageResult<()> {
        let _serialized = self.guard.lock();
        let mut batch = WriteBatch::new();
        batch.delete(operation.key());
        self.backend.apply(&section(&operation.collection), batch)
    }

    /// Bulk delete filtered by optional id and/or method set.
    ///
    /// Used when an entity is deleted locally (collapsing any earlier
    /// create/update) or when a server round-trip supersedes a batch of
    /// entries for an id. Returns the count removed.
    pub fn remove_all(
        &self,
        collection: &str,
        object_id: Option<&EntityId>,
        methods: Option<&[OperationMethod]>,
    ) -> StorageResult<u64> {
        let _serialized = self.guard.lock();

        let mut batch = WriteBatch::new();
        let mut removed = 0u64;
        for (key, document) in self.backend.scan(&section(collection))? {
            let operation = decode_operation(document)?;
            if let Some(id) = object_id {
                if operation.object_id.as_ref() != Some(id) {
                    continue;
                }
            }
            if let Some(methods) = methods {
                if !methods.contains(&operation.method) {
                    continue;
                }
            }
            batch.delete(key);
            removed += 1;
        }

        if !batch.is_empty() {
            self.backend.apply(&section(collection), batch)?;
        }
        Ok(removed)
    }

    /// Counts pending entries for a collection.
    pub fn count(&self, collection: &str) -> StorageResult<u64> {
        let _serialized = self.guard.lock();
        Ok(self.backend.scan(&section(collection))?.len() as u64)
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue").finish_non_exhaustive()
    }
}

fn section(collection: &str) -> String {
    format!("queue:{collection}")
}

fn encode_operation(operation: &PendingOperation) -> StorageResult<Document> {
    match serde_json::to_value(operation)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(crate::error::StorageError::corrupted(
            "pending operation must encode to an object",
        )),
    }
}

fn decode_operation(document: Document) -> StorageResult<PendingOperation> {
    Ok(serde_json::from_value(serde_json::Value::Object(document))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use proptest::prelude::*;
    use serde_json::json;

    fn queue() -> SyncQueue {
        SyncQueue::new(Arc::new(MemoryBackend::new()))
    }

    fn payload(value: serde_json::Value) -> Option<Document> {
        match value {
            serde_json::Value::Object(map) => Some(map),
            _ => panic!("expected object"),
        }
    }

    fn create_op(collection: &str, id: &str, body: serde_json::Value) -> PendingOperation {
        PendingOperation::new(
            collection,
            Some(EntityId::new(id)),
            OperationMethod::Create,
            payload(body),
        )
    }

    #[test]
    fn method_http_mapping() {
        assert_eq!(OperationMethod::from_http("POST"), Some(OperationMethod::Create));
        assert_eq!(OperationMethod::from_http("put"), Some(OperationMethod::Update));
        assert_eq!(OperationMethod::from_http("DELETE"), Some(OperationMethod::Delete));
        assert_eq!(OperationMethod::from_http("GET"), None);

        assert_eq!(OperationMethod::Create.as_http(), "POST");
    }

    #[test]
    fn from_request_skips_reads() {
        assert!(PendingOperation::from_request("notes", "GET", None, None).is_none());

        let op = PendingOperation::from_request(
            "notes",
            "DELETE",
            Some(EntityId::new("r1")),
            None,
        )
        .unwrap();
        assert_eq!(op.method, OperationMethod::Delete);
    }

    #[test]
    fn coalescing_keeps_latest_entry() {
        let queue = queue();

        queue
            .save(&create_op("notes", "r1", json!({"title": "first"})))
            .unwrap();

        let update = PendingOperation::new(
            "notes",
            Some(EntityId::new("r1")),
            OperationMethod::Update,
            payload(json!({"title": "second"})),
        );
        queue.save(&update).unwrap();

        let pending = queue.pending("notes").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].method, OperationMethod::Update);
        assert_eq!(
            pending[0].payload.as_ref().unwrap().get("title"),
            Some(&json!("second"))
        );
    }

    #[test]
    fn collection_wide_deletes_do_not_coalesce() {
        let queue = queue();

        let d1 = PendingOperation::new("notes", None, OperationMethod::Delete, payload(json!({"filter": "a"})));
        let d2 = PendingOperation::new("notes", None, OperationMethod::Delete, payload(json!({"filter": "b"})));
        queue.save(&d1).unwrap();
        queue.save(&d2).unwrap();

        assert_eq!(queue.count("notes").unwrap(), 2);
    }

    #[test]
    fn pending_for_finds_by_id() {
        let queue = queue();
        queue
            .save(&create_op("notes", "r1", json!({"a": 1})))
            .unwrap();

        let found = queue
            .pending_for("notes", &EntityId::new("r1"))
            .unwrap()
            .unwrap();
        assert_eq!(found.method, OperationMethod::Create);

        assert!(queue
            .pending_for("notes", &EntityId::new("missing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn remove_single_entry() {
        let queue = queue();
        let op = create_op("notes", "r1", json!({"a": 1}));
        queue.save(&op).unwrap();
        queue.remove(&op).unwrap();

        assert_eq!(queue.count("notes").unwrap(), 0);
    }

    #[test]
    fn remove_all_filters_by_id_and_method() {
        let queue = queue();
        queue.save(&create_op("notes", "r1", json!({}))).unwrap();
        queue
            .save(&PendingOperation::new(
                "notes",
                Some(EntityId::new("r2")),
                OperationMethod::Update,
                payload(json!({})),
            ))
            .unwrap();
        queue
            .save(&PendingOperation::new(
                "notes",
                Some(EntityId::new("r3")),
                OperationMethod::Delete,
                None,
            ))
            .unwrap();

        // Method-set filter only touches matching entries.
        let removed = queue
            .remove_all(
                "notes",
                None,
                Some(&[OperationMethod::Create, OperationMethod::Update]),
            )
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(queue.count("notes").unwrap(), 1);

        // Id filter removes the remaining delete.
        let removed = queue
            .remove_all("notes", Some(&EntityId::new("r3")), None)
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(queue.count("notes").unwrap(), 0);
    }

    #[test]
    fn collections_are_disjoint() {
        let queue = queue();
        queue.save(&create_op("notes", "r1", json!({}))).unwrap();
        queue.save(&create_op("books", "r1", json!({}))).unwrap();

        assert_eq!(queue.count("notes").unwrap(), 1);
        assert_eq!(queue.remove_all("notes", None, None).unwrap(), 1);
        assert_eq!(queue.count("books").unwrap(), 1);
    }

    proptest! {
        /// Regardless of how many writes land on a small id set, the
        /// queue holds one entry per distinct id.
        #[test]
        fn queue_growth_bounded_by_distinct_ids(ids in proptest::collection::vec(0u8..5, 1..40)) {
            let queue = queue();

            for (i, id) in ids.iter().enumerate() {
                let op = PendingOperation::new(
                    "notes",
                    Some(EntityId::new(format!("r{id}"))),
                    if i % 2 == 0 { OperationMethod::Create } else { OperationMethod::Update },
                    payload(json!({"seq": i})),
                );
                queue.save(&op).unwrap();
            }

            let distinct: std::collections::BTreeSet<_> = ids.iter().collect();
            prop_assert_eq!(queue.count("notes").unwrap(), distinct.len() as u64);
        }
    }
}
