//! Entity identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reserved prefix for client-generated temporary ids.
///
/// A temporary id is assigned locally before the first successful network
/// save and is fully retired once the server assigns a permanent id.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Unique identifier for an entity within a collection.
///
/// Entity ids are opaque strings assigned by the server, except for
/// temporary ids which are generated client-side with the [`TEMP_ID_PREFIX`]
/// so the two can never be confused. An id, once assigned to a cached
/// record, never changes.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity id from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new temporary id.
    #[must_use]
    pub fn temporary() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()))
    }

    /// Returns true if this is a client-generated temporary id.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    /// Returns the id as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_is_unique() {
        let id1 = EntityId::temporary();
        let id2 = EntityId::temporary();
        assert_ne!(id1, id2);
    }

    #[test]
    fn temporary_has_prefix() {
        let id = EntityId::temporary();
        assert!(id.is_temporary());
        assert!(id.as_str().starts_with(TEMP_ID_PREFIX));
    }

    #[test]
    fn server_id_is_not_temporary() {
        let id = EntityId::new("5f1e2d3c4b5a");
        assert!(!id.is_temporary());
    }

    #[test]
    fn string_roundtrip() {
        let id = EntityId::new("abc123");
        let s: String = id.clone().into();
        assert_eq!(s, "abc123");
        assert_eq!(EntityId::from(s), id);
    }

    #[test]
    fn serde_is_transparent() {
        let id = EntityId::new("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");

        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn display() {
        let id = EntityId::new("abc");
        assert_eq!(format!("{id}"), "abc");
        assert_eq!(format!("{id:?}"), "EntityId(abc)");
    }
}
