//! Bounded worker pool with per-key ordering.

use crate::error::{SyncError, SyncResult};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    key: Option<String>,
    job: Job,
}

#[derive(Default)]
struct Lane {
    busy: bool,
    waiting: VecDeque<Job>,
}

#[derive(Default)]
struct DispatchState {
    ready: VecDeque<QueuedJob>,
    lanes: BTreeMap<String, Lane>,
}

struct Inner {
    state: Mutex<DispatchState>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

/// Best-effort cancellation flag shared with in-flight work.
///
/// Cancelling skips jobs that have not started; sub-effects of already
/// completed jobs are never rolled back.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a fresh, uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A waitable result of a dispatched job.
pub struct TaskHandle<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> TaskHandle<T> {
    /// Waits for the result with a bounded timeout.
    ///
    /// Returns [`SyncError::Timeout`] when the wait expires and
    /// [`SyncError::Cancelled`] when the job was dropped unrun.
    pub fn wait(&self, timeout: Duration) -> SyncResult<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(SyncError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(SyncError::Cancelled),
        }
    }
}

/// A bounded worker pool executing network jobs.
///
/// Ordering is expressed with explicit run-after edges rather than
/// locks: a job submitted with a key runs only after every previously
/// enqueued job with the same key has completed (per-key FIFO, at most
/// one in flight per key). Unkeyed jobs run freely and concurrently.
///
/// The engine keys background write replays and push batches by
/// collection name, so a Push never races an outstanding Save's
/// background network call for the same collection.
pub struct Dispatcher {
    inner: Arc<Inner>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Creates a pool with the given number of worker threads (min 1).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(DispatchState::default()),
            work_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let workers = (0..threads.max(1))
            .map(|_| {
                let inner = Arc::clone(&inner);
                thread::spawn(move || worker_loop(&inner))
            })
            .collect();

        Self { inner, workers }
    }

    /// Dispatches a job, optionally ordered behind earlier jobs with the
    /// same key. Returns a handle for the job's result.
    pub fn run<T, F>(&self, key: Option<&str>, task: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let job: Job = Box::new(move || {
            // The receiver may be gone for fire-and-forget jobs.
            let _ = tx.send(task());
        });
        self.enqueue(key, job);
        TaskHandle { rx }
    }

    /// Enqueues a keyed no-op.
    ///
    /// Waiting on the returned handle establishes that every job
    /// previously enqueued for the key has completed.
    pub fn barrier(&self, key: &str) -> TaskHandle<()> {
        self.run(Some(key), || ())
    }

    fn enqueue(&self, key: Option<&str>, job: Job) {
        let mut state = self.inner.state.lock();
        match key {
            Some(key) => {
                let lane = state.lanes.entry(key.to_string()).or_default();
                if lane.busy {
                    lane.waiting.push_back(job);
                } else {
                    lane.busy = true;
                    state.ready.push_back(QueuedJob {
                        key: Some(key.to_string()),
                        job,
                    });
                    self.inner.work_ready.notify_one();
                }
            }
            None => {
                state.ready.push_back(QueuedJob { key: None, job });
                self.inner.work_ready.notify_one();
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.work_ready.notify_all();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers.len())
            .finish_non_exhaustive()
    }
}

fn worker_loop(inner: &Inner) {
    loop {
        let queued = {
            let mut state = inner.state.lock();
            loop {
                if let Some(job) = state.ready.pop_front() {
                    break job;
                }
                if inner.shutdown.load(Ordering::SeqCst) {
                    return;
                }
                inner.work_ready.wait(&mut state);
            }
        };

        (queued.job)();

        if let Some(key) = queued.key {
            let mut state = inner.state.lock();
            let next = match state.lanes.get_mut(&key) {
                Some(lane) => {
                    let next = lane.waiting.pop_front();
                    if next.is_none() {
                        lane.busy = false;
                    }
                    next
                }
                None => None,
            };

            match next {
                Some(job) => {
                    state.ready.push_back(QueuedJob {
                        key: Some(key),
                        job,
                    });
                    inner.work_ready.notify_one();
                }
                None => {
                    if state
                        .lanes
                        .get(&key)
                        .is_some_and(|lane| !lane.busy && lane.waiting.is_empty())
                    {
                        state.lanes.remove(&key);
                    }
                }
            }
        }
    }
}
