//! The indexing orchestrator.
//!
//! Composes the walker, chunker, embedder, vector store, and journal. The
//! per-file reconcile brings the stored representation of one file into
//! agreement with its on-disk content: old rows are deleted by their
//! journaled ids, fresh chunks are embedded and inserted under new ids, and
//! the journal entry is replaced only after the insert succeeds. A crash
//! between insert and journal save leaves orphan rows; the path sweep at the
//! start of the next reconcile heals them.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    chunk_id::ChunkId,
    chunking::{ChunkerConfig, chunk_file},
    config::{Config, IndexingConfig},
    data_dir::DataDir,
    embedding::Embedder,
    error::Result,
    state::{FileEntry, StateJournal, now_ms},
    vector_store::{ChunkRecord, SearchHit, StoreStats, VectorStore},
    walker::Walker,
};

/// How many leading chars are scanned for NUL when sniffing binaries.
const BINARY_SAMPLE_SIZE: usize = 8000;

/// Result of reconciling one file. Failures are values, not unwinds: an
/// error leaves the journal untouched so the next reconcile retries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub chunks: usize,
    pub skipped: bool,
    pub error: Option<String>,
}

impl ReconcileOutcome {
    fn skipped() -> Self {
        Self {
            chunks: 0,
            skipped: true,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            chunks: 0,
            skipped: true,
            error: Some(message),
        }
    }

    fn indexed(chunks: usize) -> Self {
        Self {
            chunks,
            skipped: false,
            error: None,
        }
    }
}

/// Accumulated counters for a full-tree pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_chunks: usize,
}

/// Single-writer orchestrator over the vector store and journal.
pub struct Indexer<'a, E: Embedder> {
    embedder: &'a E,
    store: VectorStore,
    journal: StateJournal,
    walker: Walker,
    chunker: ChunkerConfig,
    indexing: IndexingConfig,
    max_results: usize,
    root: PathBuf,
}

impl<'a, E: Embedder> Indexer<'a, E> {
    /// Open (or create) the index under `root/.wb-grep/`.
    pub fn open(root: &Path, config: &Config, embedder: &'a E) -> Result<Self> {
        let root = root.canonicalize()?;
        let data_dir = DataDir::resolve(&root)?;
        let store = VectorStore::open(&data_dir.vectors_db())?;
        let journal = StateJournal::load(&data_dir.state_file());
        let walker = Walker::new(&root, &config.ignore.patterns)?;

        Ok(Self {
            embedder,
            store,
            journal,
            walker,
            chunker: ChunkerConfig::default(),
            indexing: config.indexing.clone(),
            max_results: config.search.max_results,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    pub fn journal(&self) -> &StateJournal {
        &self.journal
    }

    pub fn save_journal(&mut self) -> Result<()> {
        self.journal.save()
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// Reconcile one file with its current on-disk content.
    pub fn reconcile_file(&mut self, path: &Path, force: bool) -> ReconcileOutcome {
        match self.try_reconcile(path, force) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "reconcile failed");
                ReconcileOutcome::failed(e.to_string())
            }
        }
    }

    fn try_reconcile(&mut self, path: &Path, force: bool) -> Result<ReconcileOutcome> {
        let metadata = std::fs::metadata(path)?;
        if metadata.len() == 0 || metadata.len() > self.indexing.max_file_size {
            debug!(path = %path.display(), size = metadata.len(), "skipping by size");
            return Ok(ReconcileOutcome::skipped());
        }

        let content = std::fs::read_to_string(path)?;
        if looks_binary(&content) {
            debug!(path = %path.display(), "skipping binary content");
            return Ok(ReconcileOutcome::skipped());
        }

        let hash = content_hash(&content);
        let key = path.to_string_lossy().to_string();

        if !force && !self.journal.has_changed(&key, &hash) {
            return Ok(ReconcileOutcome::skipped());
        }

        // Delete the previous generation by its canonical ids first, then
        // sweep any rows a crashed run left behind under this path.
        if let Some(entry) = self.journal.get(&key) {
            let old_ids = entry.chunk_ids.clone();
            self.store.delete_by_ids(&old_ids)?;
        }
        self.store.delete_by_filepath(&key)?;

        let spans = chunk_file(&content, path, &self.chunker);
        if spans.is_empty() {
            return Ok(ReconcileOutcome::skipped());
        }

        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts, self.indexing.concurrency)?;

        let timestamp = now_ms();
        let rows: Vec<ChunkRecord> = spans
            .into_iter()
            .zip(vectors)
            .map(|(span, vector)| ChunkRecord {
                id: ChunkId::random(),
                filepath: key.clone(),
                content: span.text,
                line_start: span.line_start as u32,
                line_end: span.line_end as u32,
                vector,
                hash: hash.clone(),
                timestamp,
            })
            .collect();
        self.store.insert(&rows)?;

        let chunk_ids: Vec<ChunkId> = rows.iter().map(|r| r.id).collect();
        let chunk_count = chunk_ids.len();
        self.journal.insert(
            key,
            FileEntry {
                hash,
                last_modified: timestamp,
                chunk_ids,
                chunk_count,
            },
        );

        Ok(ReconcileOutcome::indexed(chunk_count))
    }

    /// Index the whole tree. With `clear`, the store and journal are purged
    /// first; with `force`, unchanged files are re-embedded anyway.
    ///
    /// `progress` is called with `(current, total, path)` before each file.
    /// The journal is saved every `batch_size` files and once at the end.
    pub fn index_all(
        &mut self,
        clear: bool,
        force: bool,
        mut progress: impl FnMut(usize, usize, &Path),
    ) -> Result<IndexReport> {
        if clear {
            self.store.clear()?;
            self.journal.clear();
        }

        let files = self.walker.walk();
        let total = files.len();
        let save_every = self.indexing.batch_size.max(1);
        let mut report = IndexReport::default();

        for (i, file) in files.iter().enumerate() {
            progress(i + 1, total, file);
            let outcome = self.reconcile_file(file, force);
            if outcome.error.is_some() {
                report.failed += 1;
            } else if outcome.skipped {
                report.skipped += 1;
            } else {
                report.indexed += 1;
                report.total_chunks += outcome.chunks;
            }
            if (i + 1) % save_every == 0 {
                self.journal.save()?;
            }
        }

        self.journal.save()?;
        info!(
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            chunks = report.total_chunks,
            "index pass complete"
        );
        Ok(report)
    }

    /// Remove a deleted file's rows and journal entry.
    pub fn delete_file(&mut self, path: &Path) -> Result<()> {
        let key = path.to_string_lossy().to_string();
        let Some(entry) = self.journal.get(&key) else {
            return Ok(());
        };
        let ids = entry.chunk_ids.clone();
        self.store.delete_by_ids(&ids)?;
        self.journal.remove(&key);
        self.journal.save()?;
        info!(path = %key, chunks = ids.len(), "removed deleted file from index");
        Ok(())
    }

    /// Embed a query and return the closest chunks, optionally restricted to
    /// paths under `path_filter` (resolved against the root when relative).
    pub fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        path_filter: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let vector = self.embedder.embed(query)?;
        let prefix = path_filter.map(|filter| {
            let path = Path::new(filter);
            if path.is_absolute() {
                filter.to_string()
            } else {
                self.root.join(path).to_string_lossy().to_string()
            }
        });
        self.store
            .search(&vector, limit.unwrap_or(self.max_results), prefix.as_deref())
    }

    /// Purge everything: truncate the store, empty the journal, persist.
    pub fn clear(&mut self) -> Result<()> {
        self.store.clear()?;
        self.journal.clear();
        self.journal.save()
    }

    #[cfg(test)]
    fn store(&self) -> &VectorStore {
        &self.store
    }
}

/// Hex SHA-256 of the whole file content.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// More than one NUL in the leading sample means the file is not text.
fn looks_binary(content: &str) -> bool {
    content
        .chars()
        .take(BINARY_SAMPLE_SIZE)
        .filter(|&c| c == '\0')
        .count()
        > 1
}
