//! Store backend trait definition.

use crate::error::StorageResult;
use tidestore_core::Document;

/// An atomic batch of changes to one section.
///
/// Changes are applied in a fixed order: clear, then deletes, then puts.
#[derive(Debug, Default)]
pub struct WriteBatch {
    puts: Vec<(String, Document)>,
    deletes: Vec<String>,
    clear: bool,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a row.
    pub fn put(&mut self, key: impl Into<String>, document: Document) {
        self.puts.push((key.into(), document));
    }

    /// Deletes a row if present.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.deletes.push(key.into());
    }

    /// Removes every row in the section before applying puts.
    pub fn clear_section(&mut self) {
        self.clear = true;
    }

    /// Returns true if the batch contains no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty() && !self.clear
    }

    /// Rows to add or replace.
    #[must_use]
    pub fn puts(&self) -> &[(String, Document)] {
        &self.puts
    }

    /// Keys to delete.
    #[must_use]
    pub fn deletes(&self) -> &[String] {
        &self.deletes
    }

    /// Whether the section is cleared first.
    #[must_use]
    pub fn clears_section(&self) -> bool {
        self.clear
    }
}

/// A section-structured document store.
///
/// This is the embedded-store collaborator the cache and queue persist
/// through. Backends are treated as black boxes offering two guarantees:
///
/// - **All-or-nothing writes**: [`StoreBackend::apply`] lands every
///   change in the batch or none of them
/// - **Consistent reads**: [`StoreBackend::scan`] observes a single
///   point-in-time view of the section
///
/// Backends do not interpret documents; the cache owns row semantics.
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - For tests and ephemeral stores
/// - [`super::FileBackend`] - For persistent storage
pub trait StoreBackend: Send + Sync {
    /// Reads a single row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be read.
    fn get(&self, section: &str, key: &str) -> StorageResult<Option<Document>>;

    /// Reads every row of a section as a consistent view.
    ///
    /// Returns an empty vector for an unknown section.
    ///
    /// # Errors
    ///
    /// Returns an error if the section cannot be read.
    fn scan(&self, section: &str) -> StorageResult<Vec<(String, Document)>>;

    /// Applies a batch of changes atomically.
    ///
    /// After this returns successfully, all changes are durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be applied; in that case no
    /// change from the batch is visible.
    fn apply(&self, section: &str, batch: WriteBatch) -> StorageResult<()>;

    /// Lists the sections currently holding rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing cannot be produced.
    fn sections(&self) -> StorageResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_starts_empty() {
        let batch = WriteBatch::new();
        assert!(batch.is_empty());
        assert!(!batch.clears_section());
    }

    #[test]
    fn batch_records_changes() {
        let mut batch = WriteBatch::new();
        batch.put("a", Document::new());
        batch.delete("b");

        assert!(!batch.is_empty());
        assert_eq!(batch.puts().len(), 1);
        assert_eq!(batch.deletes(), &["b".to_string()]);
    }

    #[test]
    fn clear_marks_batch_non_empty() {
        let mut batch = WriteBatch::new();
        batch.clear_section();
        assert!(!batch.is_empty());
        assert!(batch.clears_section());
    }
}
