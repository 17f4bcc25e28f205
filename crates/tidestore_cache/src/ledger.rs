//! Pull ledger: last-pull anchors per query shape.

use crate::backend::{StoreBackend, WriteBatch};
use crate::error::StorageResult;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tidestore_core::Document;

const LAST_PULL_FIELD: &str = "last_pull";

/// Persists the time of the last successful pull per (collection, query
/// shape), anchoring the next delta computation.
pub struct PullLedger {
    backend: Arc<dyn StoreBackend>,
    guard: Mutex<()>,
}

impl PullLedger {
    /// Creates a ledger over the given backend.
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            guard: Mutex::new(()),
        }
    }

    /// Records a successful pull for a query shape.
    pub fn set_anchor(
        &self,
        collection: &str,
        shape_key: &str,
        timestamp: impl Into<String>,
    ) -> StorageResult<()> {
        let _serialized = self.guard.lock();
        let mut row = Document::new();
        row.insert(LAST_PULL_FIELD.to_string(), Value::String(timestamp.into()));

        let mut batch = WriteBatch::new();
        batch.put(shape_key, row);
        self.backend.apply(&section(collection), batch)
    }

    /// Returns the last recorded pull time for a query shape.
    pub fn anchor(&self, collection: &str, shape_key: &str) -> StorageResult<Option<String>> {
        let _serialized = self.guard.lock();
        Ok(self
            .backend
            .get(&section(collection), shape_key)?
            .and_then(|row| match row.get(LAST_PULL_FIELD) {
                Some(Value::String(ts)) => Some(ts.clone()),
                _ => None,
            }))
    }

    /// Forgets every anchor for a collection.
    pub fn clear(&self, collection: &str) -> StorageResult<()> {
        let _serialized = self.guard.lock();
        let mut batch = WriteBatch::new();
        batch.clear_section();
        self.backend.apply(&section(collection), batch)
    }
}

impl std::fmt::Debug for PullLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullLedger").finish_non_exhaustive()
    }
}

fn section(collection: &str) -> String {
    format!("ledger:{collection}")
}
