//! Record entity and metadata envelope.

use crate::error::{CoreError, CoreResult};
use crate::id::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A generic JSON document: application fields keyed by name.
pub type Document = serde_json::Map<String, Value>;

/// Access-control metadata attached to a record by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Acl {
    /// Id of the user that created the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

impl Acl {
    /// Returns true if no ACL fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creator.is_none()
    }
}

/// Server-maintained record metadata.
///
/// `last_modified_time` is an opaque server string. It is compared only
/// for equality during delta computation; no timestamp parsing happens
/// anywhere in the SDK.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Last-modified time, as reported by the server.
    #[serde(rename = "lmt", skip_serializing_if = "Option::is_none")]
    pub last_modified_time: Option<String>,

    /// Entity creation time, as reported by the server.
    #[serde(rename = "ect", skip_serializing_if = "Option::is_none")]
    pub entity_creation_time: Option<String>,
}

impl Metadata {
    /// Returns true if no metadata fields are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_modified_time.is_none() && self.entity_creation_time.is_none()
    }
}

/// An application entity stored in a collection.
///
/// The wire encoding places the id and server metadata in a fixed
/// envelope (`_id`, `_meta`, `_acl`) with all application fields
/// flattened beside it:
///
/// ```json
/// {"_id": "abc", "_meta": {"lmt": "..."}, "title": "hello"}
/// ```
///
/// A record has no id until its first save; the cache assigns a
/// temporary id at that point and the server replaces it with a
/// permanent one on the first successful network write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity id, unique within a collection. Required after first save.
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    /// Server-maintained metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,

    /// Access-control metadata.
    #[serde(rename = "_acl", default, skip_serializing_if = "Acl::is_empty")]
    pub acl: Acl,

    /// Application fields.
    #[serde(flatten)]
    pub fields: Document,
}

impl Record {
    /// Creates an empty record with no id.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with the given id.
    pub fn with_id(id: impl Into<EntityId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Sets an application field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Returns an application field, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns the record id, failing validation when absent.
    pub fn require_id(&self) -> CoreResult<&EntityId> {
        self.id
            .as_ref()
            .ok_or_else(|| CoreError::validation("record has no entity id"))
    }

    /// Returns the last-modified time string, if the server has set one.
    #[must_use]
    pub fn last_modified_time(&self) -> Option<&str> {
        self.metadata.last_modified_time.as_deref()
    }

    /// Encodes the record into a generic document.
    pub fn to_document(&self) -> CoreResult<Document> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(CoreError::validation(format!(
                "record encoded to non-object value: {other}"
            ))),
        }
    }

    /// Decodes a record from a generic document.
    pub fn from_document(document: Document) -> CoreResult<Self> {
        Ok(serde_json::from_value(Value::Object(document))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_encoding() {
        let mut record = Record::with_id("abc");
        record.metadata.last_modified_time = Some("2024-01-01T00:00:00.000Z".into());
        record.set("title", "hello");
        record.set("count", 3);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "_id": "abc",
                "_meta": {"lmt": "2024-01-01T00:00:00.000Z"},
                "title": "hello",
                "count": 3,
            })
        );
    }

    #[test]
    fn envelope_decoding() {
        let value = json!({
            "_id": "abc",
            "_meta": {"lmt": "x", "ect": "y"},
            "_acl": {"creator": "user-1"},
            "title": "hello",
        });

        let record: Record = serde_json::from_value(value).unwrap();
        assert_eq!(record.id, Some(EntityId::new("abc")));
        assert_eq!(record.last_modified_time(), Some("x"));
        assert_eq!(record.metadata.entity_creation_time.as_deref(), Some("y"));
        assert_eq!(record.acl.creator.as_deref(), Some("user-1"));
        assert_eq!(record.get("title"), Some(&json!("hello")));
    }

    #[test]
    fn missing_envelope_is_default() {
        let value = json!({"title": "bare"});
        let record: Record = serde_json::from_value(value).unwrap();
        assert!(record.id.is_none());
        assert!(record.metadata.is_empty());
        assert!(record.acl.is_empty());
    }

    #[test]
    fn require_id_fails_without_id() {
        let record = Record::new();
        assert!(matches!(
            record.require_id(),
            Err(CoreError::Validation { .. })
        ));

        let record = Record::with_id("abc");
        assert_eq!(record.require_id().unwrap().as_str(), "abc");
    }

    #[test]
    fn document_roundtrip() {
        let mut record = Record::with_id("r1");
        record.set("n", 42);

        let doc = record.to_document().unwrap();
        assert_eq!(doc.get("_id"), Some(&json!("r1")));

        let back = Record::from_document(doc).unwrap();
        assert_eq!(back, record);
    }
}
