//! # Tidestore Cache
//!
//! Local persistence for Tidestore: the record cache, the
//! pending-operation queue, the pull ledger, and the store backends they
//! persist through.
//!
//! ## Design Principles
//!
//! - Backends are section-structured document stores with all-or-nothing
//!   batches and consistent reads; they do not interpret rows
//! - One cache store and one queue store per local-store scope, each
//!   holding one section per collection name
//! - Access per store instance is serialized, so no reader ever observes
//!   a torn write
//! - Corruption surfaces to the caller; the SDK never wipes a store on
//!   its own
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For testing and ephemeral stores
//! - [`FileBackend`] - Persistent JSON snapshot with an exclusive lock
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tidestore_cache::{LocalCache, MemoryBackend};
//! use tidestore_core::Record;
//!
//! let cache = LocalCache::new(Arc::new(MemoryBackend::new()));
//! let mut record = Record::new();
//! record.set("title", "hello");
//!
//! let saved = cache.save("notes", record).unwrap();
//! assert!(saved.id.unwrap().is_temporary());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod error;
mod file;
mod ledger;
mod memory;
mod queue;

pub use backend::{StoreBackend, WriteBatch};
pub use cache::LocalCache;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use ledger::PullLedger;
pub use memory::MemoryBackend;
pub use queue::{OperationMethod, PendingOperation, SyncQueue};
