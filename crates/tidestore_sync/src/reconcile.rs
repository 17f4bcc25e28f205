//! Push, Pull, Purge and Sync.
//!
//! The four reconciliation operations draining, refreshing, discarding
//! and composing offline state against the remote store.

use crate::datastore::DataStore;
use crate::delta::DeltaSet;
use crate::dispatcher::CancelToken;
use crate::error::{SyncError, SyncResult};
use crate::network::NetworkClient;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tidestore_cache::{LocalCache, OperationMethod, PendingOperation, SyncQueue};
use tidestore_core::{CoreError, EntityId, Filter, Query, Record};
use tracing::{debug, warn};

/// Ids fetched per `$in` query when resolving a delta set.
const DELTA_FETCH_CHUNK: usize = 200;

/// Outcome of a Push batch.
#[derive(Debug, Default)]
pub struct PushSummary {
    /// Entries replayed and acknowledged.
    pub pushed: u64,
    /// Every error collected across the batch.
    pub errors: Vec<SyncError>,
}

impl PushSummary {
    /// Collapses the summary into the caller-facing result: the pushed
    /// count on a clean batch, otherwise every collected error.
    pub fn into_result(self) -> SyncResult<u64> {
        if self.errors.is_empty() {
            Ok(self.pushed)
        } else {
            Err(SyncError::Multiple(self.errors))
        }
    }
}

/// Outcome of a Sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    /// Entries pushed.
    pub pushed: u64,
    /// Records pulled into the cache.
    pub pulled: u64,
}

impl DataStore {
    /// Replays every pending operation against the network.
    ///
    /// Entries for different ids execute concurrently on the worker
    /// pool; the batch as a whole is ordered after any background write
    /// already queued for this collection. Per entry: success removes
    /// the entry and refreshes the cache with the server copy; a
    /// credential failure (HTTP 401) removes the entry anyway and is
    /// recorded; any other failure preserves the entry and is recorded
    /// while the rest of the batch continues.
    ///
    /// Returns the pushed count when no error was collected, otherwise
    /// [`SyncError::Multiple`] carrying the full error list.
    pub fn push(&self) -> SyncResult<u64> {
        self.push_cancellable(&CancelToken::new())
    }

    /// [`DataStore::push`] with best-effort cancellation.
    ///
    /// Entries not yet started when the token fires are skipped and stay
    /// queued; one [`SyncError::Cancelled`] is recorded for the batch.
    pub fn push_cancellable(&self, token: &CancelToken) -> SyncResult<u64> {
        self.push_summary(token)?.into_result()
    }

    pub(crate) fn push_summary(&self, token: &CancelToken) -> SyncResult<PushSummary> {
        let entries = self.queue.pending(&self.collection)?;
        if entries.is_empty() {
            return Ok(PushSummary::default());
        }

        // Run-after edge: the batch must not race an in-flight Save's
        // background network write for this collection.
        self.dispatcher
            .barrier(&self.collection)
            .wait(self.config.request_timeout)?;

        let mut handles = Vec::new();
        let mut skipped = false;
        for entry in entries {
            if token.is_cancelled() {
                skipped = true;
                break;
            }

            let network = Arc::clone(&self.network);
            let cache = Arc::clone(&self.cache);
            let queue = Arc::clone(&self.queue);
            let token = token.clone();
            handles.push(self.dispatcher.run(None, move || -> SyncResult<bool> {
                if token.is_cancelled() {
                    return Ok(false);
                }

                match replay_entry(network.as_ref(), &cache, &queue, &entry) {
                    Ok(()) => Ok(true),
                    Err(error) => {
                        if error.is_credential_failure() {
                            warn!(
                                collection = %entry.collection,
                                error = %error,
                                "unrecoverable entry dropped from queue"
                            );
                            queue.remove(&entry)?;
                        } else {
                            warn!(
                                collection = %entry.collection,
                                error = %error,
                                "entry preserved for next push"
                            );
                        }
                        Err(error)
                    }
                }
            }));
        }

        let mut summary = PushSummary::default();
        for handle in handles {
            match handle.wait(self.config.request_timeout) {
                Ok(Ok(true)) => summary.pushed += 1,
                Ok(Ok(false)) => skipped = true,
                Ok(Err(error)) => summary.errors.push(error),
                Err(wait_error) => summary.errors.push(wait_error),
            }
        }
        if skipped {
            summary.errors.push(SyncError::Cancelled);
        }
        Ok(summary)
    }

    /// Refreshes the cache from the remote store for a query scope.
    ///
    /// Refuses to run while local writes are pending: a full replace
    /// would silently wipe them, so they must be pushed or purged first.
    /// When the query is unpaged, cached ids absent from the fresh
    /// remote result are removed so the cache exactly mirrors the server
    /// for that scope; a paged query never removes rows on absence
    /// alone. On success the pull time is anchored per query shape.
    pub fn pull(&self, query: &Query) -> SyncResult<Vec<Record>> {
        let pending = self.queue.count(&self.collection)?;
        if pending > 0 {
            return Err(SyncError::PendingWrites { count: pending });
        }

        let records = if self.config.use_delta_set {
            delta_reconcile(
                self.network.as_ref(),
                &self.cache,
                &self.collection,
                query,
                !query.is_paged(),
            )?
        } else {
            let fetched = fetch_records(
                self.network.as_ref(),
                &self.collection,
                query,
                self.config.auto_pagination,
                self.config.page_size,
            )?;

            if !query.is_paged() {
                let fetched_ids: BTreeSet<&str> = fetched
                    .iter()
                    .filter_map(|r| r.id.as_ref().map(EntityId::as_str))
                    .collect();
                let local = self.cache.ids_lmts(&self.collection, query)?;
                for id in local.keys() {
                    if !fetched_ids.contains(id.as_str()) {
                        self.cache
                            .remove_by_id(&self.collection, &EntityId::new(id.clone()))?;
                    }
                }
            }

            for record in &fetched {
                self.cache.save(&self.collection, record.clone())?;
            }
            fetched
        };

        self.ledger.set_anchor(
            &self.collection,
            &query.shape_key(),
            unix_timestamp_now().to_string(),
        )?;
        debug!(collection = %self.collection, pulled = records.len(), "pull complete");
        Ok(records)
    }

    /// Discards pending operations without sending them.
    ///
    /// Update entries are best-effort repaired first: the current server
    /// copy is fetched and written over the cache; when that fetch fails
    /// the entry is discarded anyway. Create entries also remove the
    /// speculative cache row, since the server never acknowledged it.
    /// Delete entries are discarded outright. Returns the purge count.
    ///
    /// This is a data-loss-accepting escape hatch and is never invoked
    /// automatically.
    pub fn purge(&self) -> SyncResult<u64> {
        let entries = self.queue.pending(&self.collection)?;

        let mut purged = 0u64;
        for entry in entries {
            match (entry.method, entry.object_id.as_ref()) {
                (OperationMethod::Update, Some(id)) => {
                    match self.network.get(&self.collection, id) {
                        Ok(server_copy) => {
                            self.cache.save(&self.collection, server_copy)?;
                        }
                        Err(error) => warn!(
                            collection = %self.collection,
                            id = %id,
                            error = %error,
                            "purge repair fetch failed; discarding entry anyway"
                        ),
                    }
                }
                (OperationMethod::Create, Some(id)) => {
                    self.cache.remove_by_id(&self.collection, id)?;
                }
                _ => {}
            }
            self.queue.remove(&entry)?;
            purged += 1;
        }
        Ok(purged)
    }

    /// Push followed by Pull.
    ///
    /// Pull only runs after every Push network call has settled, so the
    /// server state it reads reflects this device's own just-pushed
    /// writes where possible. Push errors do not skip the pull; all
    /// errors from both phases are aggregated.
    pub fn sync(&self, query: &Query) -> SyncResult<SyncSummary> {
        self.sync_cancellable(query, &CancelToken::new())
    }

    /// [`DataStore::sync`] with best-effort cancellation of the push phase.
    pub fn sync_cancellable(&self, query: &Query, token: &CancelToken) -> SyncResult<SyncSummary> {
        let push = self.push_summary(token)?;
        let mut errors = push.errors;

        let mut pulled = 0u64;
        match self.pull(query) {
            Ok(records) => pulled = records.len() as u64,
            Err(error) => errors.push(error),
        }

        if errors.is_empty() {
            Ok(SyncSummary {
                pushed: push.pushed,
                pulled,
            })
        } else {
            Err(SyncError::Multiple(errors))
        }
    }
}

/// Replays one pending entry and, on success, acknowledges it: the
/// server copy lands in the cache, a retired temporary id loses its row,
/// and the entry leaves the queue.
pub(crate) fn replay_entry(
    network: &dyn NetworkClient,
    cache: &LocalCache,
    queue: &SyncQueue,
    entry: &PendingOperation,
) -> SyncResult<()> {
    match entry.method {
        OperationMethod::Create | OperationMethod::Update => {
            let payload = entry.payload.clone().ok_or_else(|| {
                SyncError::Core(CoreError::validation("pending entry has no payload"))
            })?;
            let record = Record::from_document(payload)?;

            let server_copy = match entry.method {
                OperationMethod::Create => network.create(&entry.collection, &record)?,
                _ => network.update(&entry.collection, &record)?,
            };
            finalize_acknowledged_write(
                cache,
                queue,
                &entry.collection,
                entry.object_id.as_ref(),
                &server_copy,
            )
        }
        OperationMethod::Delete => {
            match (entry.object_id.as_ref(), entry.payload.as_ref()) {
                (Some(id), _) => {
                    network.remove_by_id(&entry.collection, id)?;
                }
                (None, Some(payload)) => {
                    let query = Query::from_document(payload.clone())?;
                    network.remove_by_query(&entry.collection, &query)?;
                }
                (None, None) => {
                    return Err(SyncError::Core(CoreError::validation(
                        "delete entry has neither id nor query",
                    )))
                }
            }
            queue.remove(entry)?;
            Ok(())
        }
    }
}

/// Bookkeeping shared by acknowledged writes (network save, replay).
///
/// Removes the old local copy when the server re-keyed the record,
/// stores the server copy, and clears now-superseded create/update
/// entries for both ids.
pub(crate) fn finalize_acknowledged_write(
    cache: &LocalCache,
    queue: &SyncQueue,
    collection: &str,
    original_id: Option<&EntityId>,
    server_copy: &Record,
) -> SyncResult<()> {
    let server_id = server_copy.require_id()?;
    let superseded = [OperationMethod::Create, OperationMethod::Update];

    if let Some(original) = original_id {
        if original != server_id {
            cache.remove_by_id(collection, original)?;
        }
        queue.remove_all(collection, Some(original), Some(&superseded))?;
    }

    cache.save(collection, server_copy.clone())?;
    queue.remove_all(collection, Some(server_id), Some(&superseded))?;
    Ok(())
}

/// Fetches records for a query, paging when configured.
///
/// Auto-pagination issues sequential bounded fetches until a short page
/// returns. Any page error aborts the whole operation; the partial
/// result is discarded.
pub(crate) fn fetch_records(
    network: &dyn NetworkClient,
    collection: &str,
    query: &Query,
    auto_pagination: bool,
    page_size: u64,
) -> SyncResult<Vec<Record>> {
    if !auto_pagination {
        return network.find(collection, query);
    }

    let mut results = Vec::new();
    let mut skip = query.skip.unwrap_or(0);
    let mut remaining = query.limit;
    loop {
        let page_limit = match remaining {
            Some(r) if r < page_size => r,
            _ => page_size,
        };
        if page_limit == 0 {
            break;
        }

        let page = network.find(collection, &query.paged(skip, page_limit))?;
        let fetched = page.len() as u64;
        results.extend(page);
        skip += fetched;
        if let Some(r) = remaining.as_mut() {
            *r = r.saturating_sub(fetched);
        }
        if fetched < page_limit {
            break;
        }
    }
    Ok(results)
}

/// Network find with write-through: fetched records land in the cache.
pub(crate) fn fetch_and_cache(
    network: &dyn NetworkClient,
    cache: &LocalCache,
    collection: &str,
    query: &Query,
    auto_pagination: bool,
    page_size: u64,
) -> SyncResult<Vec<Record>> {
    let fetched = fetch_records(network, collection, query, auto_pagination, page_size)?;
    for record in &fetched {
        cache.save(collection, record.clone())?;
    }
    Ok(fetched)
}

/// Delta-set reconciliation for a query scope.
///
/// Fetches only ids and last-modified times, diffs against the cache's
/// snapshot, removes deleted ids when `remove_deleted` holds, fetches
/// full objects only for created and updated ids, and returns the
/// reconciled result from the cache.
pub(crate) fn delta_reconcile(
    network: &dyn NetworkClient,
    cache: &LocalCache,
    collection: &str,
    query: &Query,
    remove_deleted: bool,
) -> SyncResult<Vec<Record>> {
    let remote = network.find_ids_lmts(collection, query)?;
    let local = cache.ids_lmts(collection, query)?;
    let delta = DeltaSet::compute(&remote, &local);

    if remove_deleted {
        for id in &delta.deleted {
            cache.remove_by_id(collection, &EntityId::new(id.clone()))?;
        }
    }

    let changed = delta.changed_ids();
    for chunk in changed.chunks(DELTA_FETCH_CHUNK) {
        let ids: Vec<Value> = chunk.iter().map(|id| Value::String(id.clone())).collect();
        let fetch = Query::filtered(Filter::In("_id".into(), ids));
        for record in network.find(collection, &fetch)? {
            cache.save(collection, record)?;
        }
    }

    debug!(
        collection = %collection,
        created = delta.created.len(),
        updated = delta.updated.len(),
        deleted = delta.deleted.len(),
        "delta applied"
    );
    Ok(cache.find(collection, query)?)
}

pub(crate) fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}
