//! The data store: policy-driven reads and writes over cache + network.

use crate::config::StoreConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{SyncError, SyncResult};
use crate::network::NetworkClient;
use crate::policy::{ReadPolicy, WritePolicy};
use crate::reconcile::{
    delta_reconcile, fetch_and_cache, finalize_acknowledged_write, replay_entry,
};
use crate::session::SessionProvider;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tidestore_cache::{
    LocalCache, OperationMethod, PendingOperation, PullLedger, StoreBackend, SyncQueue,
};
use tidestore_core::{EntityId, Query, Record};
use tracing::warn;

/// Staged results of a read operation.
///
/// Combined read policies deliver two results through the handle: the
/// cache result first, then the superseding network result. Single-stage
/// policies deliver one. Waits are bounded; an expired wait surfaces
/// [`SyncError::Timeout`] instead of blocking forever.
pub struct ReadHandle<T> {
    rx: mpsc::Receiver<SyncResult<T>>,
    stages: usize,
}

impl<T> ReadHandle<T> {
    fn new(rx: mpsc::Receiver<SyncResult<T>>, stages: usize) -> Self {
        Self { rx, stages }
    }

    fn single(result: SyncResult<T>) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(result);
        Self { rx, stages: 1 }
    }

    /// Number of results not yet taken.
    #[must_use]
    pub fn stages(&self) -> usize {
        self.stages
    }

    /// Takes the next staged result, or `None` when all were delivered.
    pub fn next(&mut self, timeout: Duration) -> Option<SyncResult<T>> {
        if self.stages == 0 {
            return None;
        }
        self.stages -= 1;
        Some(match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(SyncError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SyncError::Cancelled),
        })
    }

    /// Waits out every stage and returns the last (authoritative) result.
    pub fn final_result(mut self, timeout: Duration) -> SyncResult<T> {
        let mut last = None;
        while let Some(result) = self.next(timeout) {
            last = Some(result);
        }
        last.unwrap_or(Err(SyncError::Cancelled))
    }
}

/// A collection-scoped store combining the local cache, the pending
/// operation queue and the network client behind read/write policies.
///
/// Cache, queue and ledger are scoped per store instance; network calls
/// run on this store's worker pool with per-collection ordering.
pub struct DataStore {
    pub(crate) collection: String,
    pub(crate) cache: Arc<LocalCache>,
    pub(crate) queue: Arc<SyncQueue>,
    pub(crate) ledger: Arc<PullLedger>,
    pub(crate) network: Arc<dyn NetworkClient>,
    pub(crate) session: Arc<dyn SessionProvider>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) config: StoreConfig,
}

impl DataStore {
    /// Creates a store for one collection over the given backend.
    pub fn new(
        collection: impl Into<String>,
        backend: Arc<dyn StoreBackend>,
        network: Arc<dyn NetworkClient>,
        session: Arc<dyn SessionProvider>,
        config: StoreConfig,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(config.worker_threads));
        Self {
            collection: collection.into(),
            cache: Arc::new(LocalCache::new(Arc::clone(&backend))),
            queue: Arc::new(SyncQueue::new(Arc::clone(&backend))),
            ledger: Arc::new(PullLedger::new(backend)),
            network,
            session,
            dispatcher,
            config,
        }
    }

    /// The collection this store is bound to.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The local cache.
    #[must_use]
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// The pending-operation queue.
    #[must_use]
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// The pull ledger.
    #[must_use]
    pub fn ledger(&self) -> &PullLedger {
        &self.ledger
    }

    /// Number of pending operations for this collection.
    pub fn pending_count(&self) -> SyncResult<u64> {
        Ok(self.queue.count(&self.collection)?)
    }

    /// Waits until every background continuation queued so far for this
    /// collection has settled.
    pub fn settle(&self, timeout: Duration) -> SyncResult<()> {
        self.dispatcher.barrier(&self.collection).wait(timeout)
    }

    // ---- reads -----------------------------------------------------------

    /// Resolves one record by id under the configured read policy.
    pub fn get(&self, id: &EntityId) -> ReadHandle<Record> {
        self.get_with(id, self.config.read_policy)
    }

    /// Resolves one record by id under an explicit read policy.
    pub fn get_with(&self, id: &EntityId, policy: ReadPolicy) -> ReadHandle<Record> {
        if policy == ReadPolicy::ForceLocal {
            return ReadHandle::single(self.get_local(id));
        }

        let (tx, rx) = mpsc::channel();
        let mut stages = 0;

        if policy.uses_cache() {
            let _ = tx.send(self.get_local(id));
            stages += 1;
        }

        if policy.uses_network() {
            stages += 1;
            let network = Arc::clone(&self.network);
            let cache = Arc::clone(&self.cache);
            let collection = self.collection.clone();
            let id = id.clone();
            self.dispatcher.run(None, move || {
                let result = network
                    .get(&collection, &id)
                    .and_then(|record| Ok(cache.save(&collection, record)?));
                let _ = tx.send(result);
            });
        }

        ReadHandle::new(rx, stages)
    }

    /// Resolves records matching a query under the configured read policy.
    pub fn find(&self, query: &Query) -> ReadHandle<Vec<Record>> {
        self.find_with(query, self.config.read_policy)
    }

    /// Resolves records matching a query under an explicit read policy.
    ///
    /// With delta-set mode enabled and a network-reading policy, the
    /// network stage fetches only changed ids plus last-modified times,
    /// applies the delta, fetches full objects for created/updated ids
    /// only, and removes deleted ids from the cache directly.
    pub fn find_with(&self, query: &Query, policy: ReadPolicy) -> ReadHandle<Vec<Record>> {
        if policy == ReadPolicy::ForceLocal {
            return ReadHandle::single(
                self.cache
                    .find(&self.collection, query)
                    .map_err(SyncError::from),
            );
        }

        let (tx, rx) = mpsc::channel();
        let mut stages = 0;

        if policy.uses_cache() {
            let _ = tx.send(
                self.cache
                    .find(&self.collection, query)
                    .map_err(SyncError::from),
            );
            stages += 1;
        }

        if policy.uses_network() {
            stages += 1;
            let network = Arc::clone(&self.network);
            let cache = Arc::clone(&self.cache);
            let collection = self.collection.clone();
            let query = query.clone();
            let use_delta = self.config.use_delta_set;
            let auto_pagination = self.config.auto_pagination;
            let page_size = self.config.page_size;
            self.dispatcher.run(None, move || {
                let result = if use_delta {
                    delta_reconcile(network.as_ref(), &cache, &collection, &query, true)
                } else {
                    fetch_and_cache(
                        network.as_ref(),
                        &cache,
                        &collection,
                        &query,
                        auto_pagination,
                        page_size,
                    )
                };
                let _ = tx.send(result);
            });
        }

        ReadHandle::new(rx, stages)
    }

    /// Counts records matching a query under the configured read policy.
    pub fn count(&self, query: &Query) -> ReadHandle<u64> {
        self.count_with(query, self.config.read_policy)
    }

    /// Counts records matching a query under an explicit read policy.
    pub fn count_with(&self, query: &Query, policy: ReadPolicy) -> ReadHandle<u64> {
        if policy == ReadPolicy::ForceLocal {
            return ReadHandle::single(
                self.cache
                    .count(&self.collection, query)
                    .map_err(SyncError::from),
            );
        }

        let (tx, rx) = mpsc::channel();
        let mut stages = 0;

        if policy.uses_cache() {
            let _ = tx.send(
                self.cache
                    .count(&self.collection, query)
                    .map_err(SyncError::from),
            );
            stages += 1;
        }

        if policy.uses_network() {
            stages += 1;
            let network = Arc::clone(&self.network);
            let collection = self.collection.clone();
            let query = query.clone();
            self.dispatcher.run(None, move || {
                let _ = tx.send(network.count(&collection, &query));
            });
        }

        ReadHandle::new(rx, stages)
    }

    // ---- writes ----------------------------------------------------------

    /// Saves a record under the configured write policy.
    pub fn save(&self, record: Record) -> SyncResult<Record> {
        self.save_with(record, self.config.write_policy)
    }

    /// Saves a record under an explicit write policy.
    ///
    /// A network failure leaves the pending operation intact; it is
    /// replayed by the next Push, never retried inline.
    pub fn save_with(&self, record: Record, policy: WritePolicy) -> SyncResult<Record> {
        match policy {
            WritePolicy::ForceLocal => self.save_locally(record),
            WritePolicy::ForceNetwork => {
                self.require_session()?;
                self.save_networked(record)
            }
            WritePolicy::LocalThenNetwork => {
                let saved = self.save_locally(record)?;
                let id = saved.require_id()?.clone();
                self.spawn_background_replay(id);
                Ok(saved)
            }
        }
    }

    /// Removes one record by id under the configured write policy.
    pub fn remove_by_id(&self, id: &EntityId) -> SyncResult<u64> {
        self.remove_by_id_with(id, self.config.write_policy)
    }

    /// Removes one record by id under an explicit write policy.
    ///
    /// A temporary id short-circuits regardless of policy: the local row
    /// and all its pending operations are discarded outright, since the
    /// server never saw the entity.
    pub fn remove_by_id_with(&self, id: &EntityId, policy: WritePolicy) -> SyncResult<u64> {
        if id.is_temporary() {
            let removed = self.cache.remove_by_id(&self.collection, id)?;
            self.queue.remove_all(&self.collection, Some(id), None)?;
            return Ok(removed);
        }

        match policy {
            WritePolicy::ForceLocal => self.remove_locally(id),
            WritePolicy::ForceNetwork => {
                let removed = self.network.remove_by_id(&self.collection, id)?;
                self.cache.remove_by_id(&self.collection, id)?;
                self.queue.remove_all(&self.collection, Some(id), None)?;
                Ok(removed)
            }
            WritePolicy::LocalThenNetwork => {
                let removed = self.remove_locally(id)?;
                self.spawn_background_replay(id.clone());
                Ok(removed)
            }
        }
    }

    /// Removes records matching a query under the configured write policy.
    pub fn remove(&self, query: &Query) -> SyncResult<u64> {
        self.remove_with(query, self.config.write_policy)
    }

    /// Removes records matching a query under an explicit write policy.
    pub fn remove_with(&self, query: &Query, policy: WritePolicy) -> SyncResult<u64> {
        match policy {
            WritePolicy::ForceLocal => self.remove_query_locally(query).map(|(count, _)| count),
            WritePolicy::ForceNetwork => {
                let removed = self.network.remove_by_query(&self.collection, query)?;
                self.cache.remove(&self.collection, query)?;
                Ok(removed)
            }
            WritePolicy::LocalThenNetwork => {
                let (removed, enqueued) = self.remove_query_locally(query)?;
                self.spawn_background_wide_replay(enqueued);
                Ok(removed)
            }
        }
    }

    // ---- internals -------------------------------------------------------

    fn get_local(&self, id: &EntityId) -> SyncResult<Record> {
        self.cache
            .find_by_id(&self.collection, id)?
            .ok_or_else(|| SyncError::not_found(&self.collection, id.as_str()))
    }

    fn require_session(&self) -> SyncResult<()> {
        if self.session.active_user().is_none() {
            return Err(SyncError::NoActiveUser);
        }
        Ok(())
    }

    /// The forceLocal save path: cache upsert plus coalesced enqueue.
    fn save_locally(&self, record: Record) -> SyncResult<Record> {
        let had_server_id = record.id.as_ref().is_some_and(|id| !id.is_temporary());

        let saved = self.cache.save(&self.collection, record)?;
        let id = saved.require_id()?.clone();

        let method = if had_server_id {
            OperationMethod::Update
        } else {
            OperationMethod::Create
        };
        self.queue.save(&PendingOperation::new(
            &self.collection,
            Some(id),
            method,
            Some(saved.to_document()?),
        ))?;
        Ok(saved)
    }

    /// The forceNetwork save path: network only, then write-through and
    /// superseded-entry cleanup.
    fn save_networked(&self, record: Record) -> SyncResult<Record> {
        let original_id = record.id.clone();
        let is_new = original_id.as_ref().map_or(true, EntityId::is_temporary);

        let server_copy = if is_new {
            self.network.create(&self.collection, &record)?
        } else {
            self.network.update(&self.collection, &record)?
        };

        finalize_acknowledged_write(
            &self.cache,
            &self.queue,
            &self.collection,
            original_id.as_ref(),
            &server_copy,
        )?;
        Ok(server_copy)
    }

    fn remove_locally(&self, id: &EntityId) -> SyncResult<u64> {
        let removed = self.cache.remove_by_id(&self.collection, id)?;
        // The coalescing insert collapses any earlier create/update for
        // this id into the delete.
        self.queue.save(&PendingOperation::new(
            &self.collection,
            Some(id.clone()),
            OperationMethod::Delete,
            None,
        ))?;
        Ok(removed)
    }

    /// Local query removal: deletes matching rows, discards queue state
    /// for never-synced entities, enqueues deletes for synced ones, and
    /// captures a collection-wide delete for an unscoped query.
    fn remove_query_locally(&self, query: &Query) -> SyncResult<(u64, Vec<PendingOperation>)> {
        let matched = self.cache.find(&self.collection, query)?;
        let removed = self.cache.remove(&self.collection, query)?;

        let mut enqueued = Vec::new();
        for record in &matched {
            let Some(id) = record.id.as_ref() else {
                continue;
            };
            if id.is_temporary() {
                self.queue.remove_all(&self.collection, Some(id), None)?;
            } else {
                let op = PendingOperation::new(
                    &self.collection,
                    Some(id.clone()),
                    OperationMethod::Delete,
                    None,
                );
                self.queue.save(&op)?;
                enqueued.push(op);
            }
        }

        // Rows that exist remotely but were never cached are only
        // covered by a collection-wide delete.
        if query.is_unfiltered() && !query.is_paged() {
            let op = PendingOperation::new(
                &self.collection,
                None,
                OperationMethod::Delete,
                Some(query.to_document()?),
            );
            self.queue.save(&op)?;
            enqueued.push(op);
        }

        Ok((removed, enqueued))
    }

    /// Schedules the background continuation of a localThenNetwork
    /// write: replay whatever entry is currently queued for the id. The
    /// outcome is observable only via queue and cache state.
    fn spawn_background_replay(&self, id: EntityId) {
        let network = Arc::clone(&self.network);
        let cache = Arc::clone(&self.cache);
        let queue = Arc::clone(&self.queue);
        let session = Arc::clone(&self.session);
        let collection = self.collection.clone();

        self.dispatcher.run(Some(&self.collection), move || {
            if session.active_user().is_none() {
                warn!(collection = %collection, "background replay skipped: no active user");
                return;
            }
            match queue.pending_for(&collection, &id) {
                Ok(Some(entry)) => {
                    if let Err(error) = replay_entry(network.as_ref(), &cache, &queue, &entry) {
                        warn!(
                            collection = %collection,
                            id = %id,
                            error = %error,
                            "background replay failed; entry stays queued"
                        );
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(collection = %collection, error = %error, "background replay could not read queue");
                }
            }
        });
    }

    fn spawn_background_wide_replay(&self, operations: Vec<PendingOperation>) {
        if operations.is_empty() {
            return;
        }
        let network = Arc::clone(&self.network);
        let cache = Arc::clone(&self.cache);
        let queue = Arc::clone(&self.queue);
        let session = Arc::clone(&self.session);
        let collection = self.collection.clone();

        self.dispatcher.run(Some(&self.collection), move || {
            if session.active_user().is_none() {
                warn!(collection = %collection, "background replay skipped: no active user");
                return;
            }
            for operation in &operations {
                if let Err(error) = replay_entry(network.as_ref(), &cache, &queue, operation) {
                    warn!(
                        collection = %collection,
                        error = %error,
                        "background replay failed; entry stays queued"
                    );
                }
            }
        });
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStore")
            .field("collection", &self.collection)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
