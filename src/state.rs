//! The durable file-state journal.
//!
//! The journal maps each indexed file to the content hash and chunk ids it
//! was last indexed with. It is the source of truth for change detection and
//! for knowing which vector rows belong to which file. Persisted as one
//! pretty-printed JSON document, written only when dirty.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{chunk_id::ChunkId, error::Result};

/// Journal schema version.
pub const STATE_VERSION: &str = "1.0.0";

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-file journal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Hex SHA-256 of the whole file at indexing time.
    pub hash: String,
    /// Milliseconds since epoch when the file was last reconciled.
    pub last_modified: u64,
    /// Ids of the chunk rows currently in the vector store for this file.
    pub chunk_ids: Vec<ChunkId>,
    pub chunk_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    version: String,
    last_sync: u64,
    files: BTreeMap<String, FileEntry>,
}

/// In-memory journal with lazy persistence.
///
/// Mutating methods move the journal to the dirty state; [`StateJournal::save`]
/// writes the snapshot only when dirty and moves it back to clean.
#[derive(Debug)]
pub struct StateJournal {
    path: PathBuf,
    files: BTreeMap<String, FileEntry>,
    last_sync: u64,
    dirty: bool,
}

impl StateJournal {
    /// Load the journal from `path`. A missing or corrupt file yields an
    /// empty journal without error.
    pub fn load(path: &Path) -> Self {
        let (files, last_sync) = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<StateFile>(&raw) {
                Ok(state) => (state.files, state.last_sync),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt journal, starting fresh");
                    (BTreeMap::new(), 0)
                }
            },
            Err(_) => (BTreeMap::new(), 0),
        };

        Self {
            path: path.to_path_buf(),
            files,
            last_sync,
            dirty: false,
        }
    }

    /// Write the snapshot to disk if anything changed since the last save.
    ///
    /// Creates parent directories as needed and advances `lastSync`.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.last_sync = now_ms();
        let state = StateFile {
            version: STATE_VERSION.to_string(),
            last_sync: self.last_sync,
            files: self.files.clone(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&state)?)?;
        self.dirty = false;
        Ok(())
    }

    /// Whether `path` needs (re-)indexing given its current content hash.
    pub fn has_changed(&self, path: &str, hash: &str) -> bool {
        self.files.get(path).is_none_or(|entry| entry.hash != hash)
    }

    pub fn get(&self, path: &str) -> Option<&FileEntry> {
        self.files.get(path)
    }

    /// Record a successful reconcile for `path`, replacing any prior entry.
    pub fn insert(&mut self, path: String, entry: FileEntry) {
        self.files.insert(path, entry);
        self.dirty = true;
    }

    /// Drop the entry for `path`; returns the removed entry if present.
    pub fn remove(&mut self, path: &str) -> Option<FileEntry> {
        let removed = self.files.remove(path);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Drop every entry (a purge before a clean rebuild).
    pub fn clear(&mut self) {
        if !self.files.is_empty() {
            self.files.clear();
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn last_sync(&self) -> u64 {
        self.last_sync
    }

    pub fn files(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.files.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str) -> FileEntry {
        FileEntry {
            hash: hash.to_string(),
            last_modified: 1_700_000_000_000,
            chunk_ids: vec![ChunkId::from_value(1), ChunkId::from_value(2)],
            chunk_count: 2,
        }
    }

    #[test]
    fn load_missing_yields_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let journal = StateJournal::load(&tmp.path().join("state.json"));
        assert!(journal.is_empty());
        assert_eq!(journal.last_sync(), 0);
    }

    #[test]
    fn load_corrupt_yields_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let journal = StateJournal::load(&path);
        assert!(journal.is_empty());
    }

    #[test]
    fn save_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");

        let mut journal = StateJournal::load(&path);
        journal.insert("/repo/a.py".to_string(), entry("abc"));
        journal.save().unwrap();
        assert!(journal.last_sync() > 0);

        let reloaded = StateJournal::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("/repo/a.py"), Some(&entry("abc")));
        assert_eq!(reloaded.last_sync(), journal.last_sync());
    }

    #[test]
    fn save_skipped_when_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("state.json");

        let mut journal = StateJournal::load(&path);
        journal.save().unwrap();
        assert!(!path.exists());

        journal.insert("/repo/a.py".to_string(), entry("abc"));
        journal.save().unwrap();
        assert!(path.exists());

        // A second save with no mutations must not advance lastSync.
        let first_sync = journal.last_sync();
        journal.save().unwrap();
        assert_eq!(journal.last_sync(), first_sync);
    }

    #[test]
    fn has_changed_semantics() {
        let tmp = tempfile::tempdir().unwrap();
        let mut journal = StateJournal::load(&tmp.path().join("state.json"));

        assert!(journal.has_changed("/repo/a.py", "abc"));
        journal.insert("/repo/a.py".to_string(), entry("abc"));
        assert!(!journal.has_changed("/repo/a.py", "abc"));
        assert!(journal.has_changed("/repo/a.py", "def"));
    }

    #[test]
    fn remove_marks_dirty_only_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");
        let mut journal = StateJournal::load(&path);

        assert!(journal.remove("/repo/a.py").is_none());
        journal.save().unwrap();
        assert!(!path.exists());

        journal.insert("/repo/a.py".to_string(), entry("abc"));
        assert!(journal.remove("/repo/a.py").is_some());
        journal.save().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state.json");

        let mut journal = StateJournal::load(&path);
        journal.insert("/repo/a.py".to_string(), entry("abc"));
        journal.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"lastSync\""));
        assert!(raw.contains("\"chunkIds\""));
        assert!(raw.contains("\"chunkCount\""));
        assert!(raw.contains("\"lastModified\""));
        assert!(raw.contains("\"version\": \"1.0.0\""));
    }
}
