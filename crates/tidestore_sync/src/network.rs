//! Network client abstraction and in-memory mock.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tidestore_core::{EntityId, Query, Record};
use uuid::Uuid;

/// The remote document-store collaborator.
///
/// This trait owns the wire: implementations build and execute the
/// actual requests (HTTP or otherwise) and surface typed results. The
/// engine invokes it from dispatcher workers; nothing in this trait
/// blocks callers directly.
pub trait NetworkClient: Send + Sync {
    /// Fetches one record by id.
    fn get(&self, collection: &str, id: &EntityId) -> SyncResult<Record>;

    /// Fetches records matching a query.
    fn find(&self, collection: &str, query: &Query) -> SyncResult<Vec<Record>>;

    /// Fetches only ids and last-modified times for a query scope.
    ///
    /// The cheap half of delta-set computation; never returns full
    /// records.
    fn find_ids_lmts(
        &self,
        collection: &str,
        query: &Query,
    ) -> SyncResult<BTreeMap<String, String>>;

    /// Counts records matching a query.
    fn count(&self, collection: &str, query: &Query) -> SyncResult<u64>;

    /// Creates a record; the server assigns the permanent id and
    /// metadata of the returned copy.
    fn create(&self, collection: &str, record: &Record) -> SyncResult<Record>;

    /// Updates a record by its id; returns the server copy.
    fn update(&self, collection: &str, record: &Record) -> SyncResult<Record>;

    /// Deletes one record by id; returns the count removed.
    fn remove_by_id(&self, collection: &str, id: &EntityId) -> SyncResult<u64>;

    /// Deletes records matching a query; returns the count removed.
    fn remove_by_query(&self, collection: &str, query: &Query) -> SyncResult<u64>;
}

/// Which network operation a call performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkOp {
    /// [`NetworkClient::get`].
    Get,
    /// [`NetworkClient::find`].
    Find,
    /// [`NetworkClient::find_ids_lmts`].
    FindIdsLmts,
    /// [`NetworkClient::count`].
    Count,
    /// [`NetworkClient::create`].
    Create,
    /// [`NetworkClient::update`].
    Update,
    /// [`NetworkClient::remove_by_id`].
    RemoveById,
    /// [`NetworkClient::remove_by_query`].
    RemoveByQuery,
}

/// One attempted request, as recorded by [`MockNetwork`].
#[derive(Debug, Clone)]
pub struct NetworkCall {
    /// Operation kind.
    pub op: NetworkOp,
    /// Target collection.
    pub collection: String,
    /// Target entity id, when the call addressed one.
    pub object_id: Option<String>,
}

/// Failure kinds a [`MockNetwork`] rule can inject.
#[derive(Debug, Clone, Copy)]
pub enum MockFailure {
    /// Transport failure, retryable.
    Network,
    /// Server answered with the given status.
    Server(u16),
    /// Bounded wait expired.
    Timeout,
}

impl MockFailure {
    fn to_error(self) -> SyncError {
        match self {
            MockFailure::Network => SyncError::network_retryable("simulated network failure"),
            MockFailure::Server(401) => SyncError::server(401, "insufficient credentials"),
            MockFailure::Server(status) => SyncError::server(status, "simulated server failure"),
            MockFailure::Timeout => SyncError::Timeout,
        }
    }
}

#[derive(Debug)]
struct FailureRule {
    op: Option<NetworkOp>,
    collection: Option<String>,
    object_id: Option<String>,
    failure: MockFailure,
    remaining: u32,
}

impl FailureRule {
    fn matches(&self, op: NetworkOp, collection: &str, object_id: Option<&str>) -> bool {
        self.remaining > 0
            && self.op.map_or(true, |o| o == op)
            && self.collection.as_deref().map_or(true, |c| c == collection)
            && self
                .object_id
                .as_deref()
                .map_or(true, |id| Some(id) == object_id)
    }
}

#[derive(Debug, Default)]
struct MockState {
    collections: BTreeMap<String, BTreeMap<String, Record>>,
    rules: Vec<FailureRule>,
    calls: Vec<NetworkCall>,
    lmt_seq: u64,
}

/// An in-memory network client for testing.
///
/// Behaves as a reference server: assigns permanent ids (`srv-…`) on
/// create, stamps monotonic last-modified strings on every write,
/// evaluates queries against its collections, records every attempted
/// call, and honors injected failure rules scoped by operation,
/// collection and id.
#[derive(Debug, Default)]
pub struct MockNetwork {
    state: Mutex<MockState>,
}

impl MockNetwork {
    /// Creates an empty mock server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record server-side without recording a call.
    ///
    /// Missing or temporary ids are replaced with a server id. Returns
    /// the stored copy.
    pub fn seed(&self, collection: &str, record: Record) -> Record {
        let mut state = self.state.lock();
        Self::store(&mut state, collection, record)
    }

    /// Injects a failure rule.
    ///
    /// `None` fields match anything; `times` bounds how often the rule
    /// fires before expiring.
    pub fn fail(
        &self,
        op: Option<NetworkOp>,
        collection: Option<&str>,
        object_id: Option<&str>,
        failure: MockFailure,
        times: u32,
    ) {
        self.state.lock().rules.push(FailureRule {
            op,
            collection: collection.map(str::to_string),
            object_id: object_id.map(str::to_string),
            failure,
            remaining: times,
        });
    }

    /// Returns every attempted call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<NetworkCall> {
        self.state.lock().calls.clone()
    }

    /// Counts attempted calls of one kind.
    #[must_use]
    pub fn calls_for(&self, op: NetworkOp) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op == op).count()
    }

    /// Returns the server-side copy of a record, if present.
    #[must_use]
    pub fn server_record(&self, collection: &str, id: &str) -> Option<Record> {
        self.state
            .lock()
            .collections
            .get(collection)
            .and_then(|rows| rows.get(id))
            .cloned()
    }

    /// Returns the number of records a collection holds server-side.
    #[must_use]
    pub fn server_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Logs the attempted call and applies the first matching rule.
    fn begin(
        state: &mut MockState,
        op: NetworkOp,
        collection: &str,
        object_id: Option<&str>,
    ) -> SyncResult<()> {
        state.calls.push(NetworkCall {
            op,
            collection: collection.to_string(),
            object_id: object_id.map(str::to_string),
        });

        if let Some(rule) = state
            .rules
            .iter_mut()
            .find(|rule| rule.matches(op, collection, object_id))
        {
            rule.remaining -= 1;
            return Err(rule.failure.to_error());
        }
        Ok(())
    }

    fn next_lmt(state: &mut MockState) -> String {
        state.lmt_seq += 1;
        format!("lmt-{:08}", state.lmt_seq)
    }

    fn store(state: &mut MockState, collection: &str, mut record: Record) -> Record {
        if record.id.as_ref().map_or(true, EntityId::is_temporary) {
            record.id = Some(EntityId::new(format!("srv-{}", Uuid::new_v4())));
        }

        let lmt = Self::next_lmt(state);
        if record.metadata.entity_creation_time.is_none() {
            record.metadata.entity_creation_time = Some(lmt.clone());
        }
        record.metadata.last_modified_time = Some(lmt);

        let id = record
            .id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id, record.clone());
        record
    }

    fn rows(state: &MockState, collection: &str) -> Vec<Record> {
        state
            .collections
            .get(collection)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl NetworkClient for MockNetwork {
    fn get(&self, collection: &str, id: &EntityId) -> SyncResult<Record> {
        let mut state = self.state.lock();
        Self::begin(&mut state, NetworkOp::Get, collection, Some(id.as_str()))?;

        state
            .collections
            .get(collection)
            .and_then(|rows| rows.get(id.as_str()))
            .cloned()
            .ok_or_else(|| SyncError::not_found(collection, id.as_str()))
    }

    fn find(&self, collection: &str, query: &Query) -> SyncResult<Vec<Record>> {
        let mut state = self.state.lock();
        Self::begin(&mut state, NetworkOp::Find, collection, None)?;
        Ok(query.apply(Self::rows(&state, collection)))
    }

    fn find_ids_lmts(
        &self,
        collection: &str,
        query: &Query,
    ) -> SyncResult<BTreeMap<String, String>> {
        let mut state = self.state.lock();
        Self::begin(&mut state, NetworkOp::FindIdsLmts, collection, None)?;

        let mut snapshot = BTreeMap::new();
        for record in query.apply(Self::rows(&state, collection)) {
            if let Some(id) = record.id.as_ref() {
                let lmt = record.last_modified_time().unwrap_or_default().to_string();
                snapshot.insert(id.to_string(), lmt);
            }
        }
        Ok(snapshot)
    }

    fn count(&self, collection: &str, query: &Query) -> SyncResult<u64> {
        let mut state = self.state.lock();
        Self::begin(&mut state, NetworkOp::Count, collection, None)?;
        Ok(query.apply(Self::rows(&state, collection)).len() as u64)
    }

    fn create(&self, collection: &str, record: &Record) -> SyncResult<Record> {
        let mut state = self.state.lock();
        Self::begin(
            &mut state,
            NetworkOp::Create,
            collection,
            record.id.as_ref().map(EntityId::as_str),
        )?;
        Ok(Self::store(&mut state, collection, record.clone()))
    }

    fn update(&self, collection: &str, record: &Record) -> SyncResult<Record> {
        let mut state = self.state.lock();
        let id = record.id.clone().ok_or(SyncError::ObjectIdMissing)?;
        Self::begin(&mut state, NetworkOp::Update, collection, Some(id.as_str()))?;
        Ok(Self::store(&mut state, collection, record.clone()))
    }

    fn remove_by_id(&self, collection: &str, id: &EntityId) -> SyncResult<u64> {
        let mut state = self.state.lock();
        Self::begin(
            &mut state,
            NetworkOp::RemoveById,
            collection,
            Some(id.as_str()),
        )?;

        let removed = state
            .collections
            .get_mut(collection)
            .and_then(|rows| rows.remove(id.as_str()))
            .is_some();
        Ok(u64::from(removed))
    }

    fn remove_by_query(&self, collection: &str, query: &Query) -> SyncResult<u64> {
        let mut state = self.state.lock();
        Self::begin(&mut state, NetworkOp::RemoveByQuery, collection, None)?;

        let matched: Vec<String> = query
            .apply(Self::rows(&state, collection))
            .into_iter()
            .filter_map(|record| record.id.map(|id| id.to_string()))
            .collect();

        if let Some(rows) = state.collections.get_mut(collection) {
            for id in &matched {
                rows.remove(id);
            }
        }
        Ok(matched.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidestore_core::Filter;

    fn record(title: &str) -> Record {
        let mut r = Record::new();
        r.set("title", title);
        r
    }

    #[test]
    fn create_assigns_server_id_and_lmt() {
        let network = MockNetwork::new();

        let mut draft = record("a");
        draft.id = Some(EntityId::temporary());

        let stored = network.create("notes", &draft).unwrap();
        let id = stored.id.clone().unwrap();
        assert!(!id.is_temporary());
        assert!(id.as_str().starts_with("srv-"));
        assert!(stored.last_modified_time().is_some());
    }

    #[test]
    fn update_bumps_lmt() {
        let network = MockNetwork::new();
        let stored = network.seed("notes", record("a"));

        let first_lmt = stored.last_modified_time().unwrap().to_string();
        let updated = network.update("notes", &stored).unwrap();
        assert_ne!(updated.last_modified_time().unwrap(), first_lmt);
    }

    #[test]
    fn update_requires_id() {
        let network = MockNetwork::new();
        let result = network.update("notes", &record("a"));
        assert!(matches!(result, Err(SyncError::ObjectIdMissing)));
    }

    #[test]
    fn get_missing_is_not_found() {
        let network = MockNetwork::new();
        let result = network.get("notes", &EntityId::new("nope"));
        assert!(matches!(result, Err(SyncError::NotFound { .. })));
    }

    #[test]
    fn find_applies_query() {
        let network = MockNetwork::new();
        let a = network.seed("notes", record("a"));
        network.seed("notes", record("b"));

        let query = Query::filtered(Filter::Eq("title".into(), json!("a")));
        let found = network.find("notes", &query).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        assert_eq!(network.count("notes", &Query::new()).unwrap(), 2);
    }

    #[test]
    fn ids_lmts_projection() {
        let network = MockNetwork::new();
        let a = network.seed("notes", record("a"));

        let snapshot = network.find_ids_lmts("notes", &Query::new()).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.get(a.id.as_ref().unwrap().as_str()).map(String::as_str),
            a.last_modified_time()
        );
    }

    #[test]
    fn failure_rules_expire() {
        let network = MockNetwork::new();
        network.seed("notes", record("a"));
        network.fail(Some(NetworkOp::Find), None, None, MockFailure::Network, 1);

        assert!(network.find("notes", &Query::new()).is_err());
        assert!(network.find("notes", &Query::new()).is_ok());
    }

    #[test]
    fn failure_rules_scope_by_id() {
        let network = MockNetwork::new();
        let a = network.seed("notes", record("a"));
        let b = network.seed("notes", record("b"));
        let a_id = a.id.unwrap();
        let b_id = b.id.unwrap();

        network.fail(None, None, Some(a_id.as_str()), MockFailure::Server(500), 1);

        assert!(network.get("notes", &a_id).is_err());
        assert!(network.get("notes", &b_id).is_ok());
    }

    #[test]
    fn calls_are_recorded() {
        let network = MockNetwork::new();
        network.seed("notes", record("a"));

        let _ = network.find("notes", &Query::new());
        let _ = network.count("notes", &Query::new());

        assert_eq!(network.calls().len(), 2);
        assert_eq!(network.calls_for(NetworkOp::Find), 1);
        assert_eq!(network.calls_for(NetworkOp::Count), 1);
    }

    #[test]
    fn remove_by_query_removes_matching() {
        let network = MockNetwork::new();
        network.seed("notes", record("a"));
        network.seed("notes", record("b"));

        let query = Query::filtered(Filter::Eq("title".into(), json!("a")));
        assert_eq!(network.remove_by_query("notes", &query).unwrap(), 1);
        assert_eq!(network.server_count("notes"), 1);
    }
}
