//! # Tidestore Core
//!
//! Data model for Tidestore, an offline-first client SDK for a remote
//! document store.
//!
//! This crate provides:
//! - Entity identifiers with client-generated temporary ids
//! - Records (JSON document entities with metadata envelopes)
//! - Queries evaluable against local records and encodable for the
//!   remote query-string protocol
//! - Model-level error types
//!
//! ## Design Principles
//!
//! - Records are plain JSON documents; serde owns the wire encoding
//! - Server-assigned fields (`_id`, `_meta`, `_acl`) live in a fixed
//!   envelope, application fields are flattened beside it
//! - A temporary id is distinguishable from a server id by prefix alone
//!
//! ## Example
//!
//! ```rust
//! use tidestore_core::{EntityId, Record};
//!
//! let mut record = Record::new();
//! record.set("title", "offline draft");
//! assert!(record.id.is_none());
//!
//! let id = EntityId::temporary();
//! assert!(id.is_temporary());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod id;
mod query;
mod record;

pub use error::{CoreError, CoreResult};
pub use id::{EntityId, TEMP_ID_PREFIX};
pub use query::{Filter, Query, SortField};
pub use record::{Acl, Document, Metadata, Record};
