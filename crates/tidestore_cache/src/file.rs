//! File-based store backend for persistent storage.

use crate::backend::{StoreBackend, WriteBatch};
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tidestore_core::Document;

type Sections = BTreeMap<String, BTreeMap<String, Document>>;

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk snapshot layout.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    sections: Sections,
}

/// A file-based store backend.
///
/// The full store is kept in memory and persisted as a JSON snapshot on
/// every applied batch, written to a temporary sibling file and moved
/// into place so a crash never leaves a half-written snapshot behind.
///
/// # Locking
///
/// A sidecar `.lock` file is held with an exclusive advisory lock for
/// the lifetime of the backend; a second process opening the same store
/// fails with [`StorageError::Locked`].
///
/// # Corruption
///
/// An unreadable or version-mismatched snapshot surfaces
/// [`StorageError::Corrupted`] from [`FileBackend::open`]. The store is
/// never rebuilt silently; the caller decides whether to delete and
/// re-pull.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    _lock: File,
    sections: RwLock<Sections>,
}

impl FileBackend {
    /// Opens or creates a store snapshot at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] when another process holds the
    /// store, [`StorageError::Corrupted`] when the snapshot cannot be
    /// interpreted, or an I/O error.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock_path = sibling_path(path, ".lock");
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        let sections = if path.exists() {
            load_snapshot(path)?
        } else {
            Sections::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
            sections: RwLock::new(sections),
        })
    }

    /// Opens or creates a store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the store
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the snapshot to a temporary file and moves it into place.
    fn persist(&self, sections: &Sections) -> StorageResult<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            sections: sections.clone(),
        };

        let tmp_path = sibling_path(&self.path, ".tmp");
        let mut tmp = File::create(&tmp_path)?;
        serde_json::to_writer(&mut tmp, &snapshot)?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl StoreBackend for FileBackend {
    fn get(&self, section: &str, key: &str) -> StorageResult<Option<Document>> {
        Ok(self
            .sections
            .read()
            .get(section)
            .and_then(|rows| rows.get(key))
            .cloned())
    }

    fn scan(&self, section: &str) -> StorageResult<Vec<(String, Document)>> {
        Ok(self
            .sections
            .read()
            .get(section)
            .map(|rows| rows.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    fn apply(&self, section: &str, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut sections = self.sections.write();

        // Mutate a copy, persist, then commit, so a failed write leaves
        // both memory and disk on the previous snapshot.
        let mut updated = sections.clone();
        let rows = updated.entry(section.to_string()).or_default();

        if batch.clears_section() {
            rows.clear();
        }
        for key in batch.deletes() {
            rows.remove(key);
        }
        for (key, document) in batch.puts() {
            rows.insert(key.clone(), document.clone());
        }
        if rows.is_empty() {
            updated.remove(section);
        }

        self.persist(&updated)?;
        *sections = updated;
        Ok(())
    }

    fn sections(&self) -> StorageResult<Vec<String>> {
        Ok(self.sections.read().keys().cloned().collect())
    }
}

/// Appends a suffix to the final path component.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn load_snapshot(path: &Path) -> StorageResult<Sections> {
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Sections::new());
    }

    let snapshot: Snapshot = serde_json::from_str(&contents)
        .map_err(|e| StorageError::corrupted(format!("invalid snapshot: {e}")))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(StorageError::corrupted(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    Ok(snapshot.sections)
}
