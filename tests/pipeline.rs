//! End-to-end pipeline tests: walk, chunk, embed, store, journal, query.
//!
//! These run against a deterministic in-process embedder so results are
//! reproducible without a live backend.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use wbgrep::{
    Config, Embedder, Indexer, Result, VectorStore,
    indexer::content_hash,
};

/// Deterministic embedder: byte histogram folded into a small fixed
/// dimension. Equal text always embeds identically, and it counts calls so
/// tests can assert that unchanged files are never re-embedded.
struct CountingEmbedder {
    dim: usize,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    fn new() -> Self {
        Self {
            dim: 8,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for CountingEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0f32; self.dim];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dim] += byte as f32 / 255.0;
        }
        Ok(vector)
    }
}

fn write_file(root: &Path, name: &str, content: &str) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn open_store(root: &Path) -> VectorStore {
    VectorStore::open(&root.join(".wb-grep/vectors/chunks.redb")).unwrap()
}

#[test]
fn empty_repo_indexes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), ".gitignore", "# nothing ignored\n");

    let embedder = CountingEmbedder::new();
    let root = {
        let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
        let report = indexer.index_all(false, false, |_, _, _| {}).unwrap();
        assert_eq!(report.indexed, 0);
        assert_eq!(report.total_chunks, 0);
        assert!(indexer.journal().is_empty());
        indexer.root().to_path_buf()
    };

    assert_eq!(open_store(&root).count().unwrap(), 0);
    assert_eq!(embedder.calls(), 0);
}

#[test]
fn single_file_yields_one_chunk_with_hash() {
    let tmp = tempfile::tempdir().unwrap();
    let content = "def f():\n    return 1\n\n\n\n\n\n\n\n";
    write_file(tmp.path(), "a.py", content);

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    let report = indexer.index_all(false, false, |_, _, _| {}).unwrap();
    assert_eq!(report.indexed, 1);
    assert_eq!(report.total_chunks, 1);

    let key = indexer.root().join("a.py").to_string_lossy().to_string();
    let entry = indexer.journal().get(&key).unwrap().clone();
    assert_eq!(entry.hash, content_hash(content));
    assert_eq!(entry.chunk_count, 1);

    let root = indexer.root().to_path_buf();
    drop(indexer);
    let store = open_store(&root);
    let row = store.get(entry.chunk_ids[0]).unwrap().unwrap();
    assert_eq!(row.line_start, 1);
    assert_eq!(row.line_end, 10);
    assert_eq!(row.content, content);
    assert_eq!(row.hash, entry.hash);
    assert_eq!(row.vector.len(), 8);
}

#[test]
fn rerun_skips_everything_without_embedding() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "a.py", "x = 1\n");
    write_file(tmp.path(), "b.py", "y = 2\n");

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    indexer.index_all(false, false, |_, _, _| {}).unwrap();
    let calls_after_first = embedder.calls();
    assert_eq!(calls_after_first, 2);

    let report = indexer.index_all(false, false, |_, _, _| {}).unwrap();
    assert_eq!(report.indexed, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(embedder.calls(), calls_after_first);
}

#[test]
fn edit_replaces_old_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let a = write_file(tmp.path(), "a.py", "x = 1\n");
    write_file(tmp.path(), "b.py", "y = 2\n");

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    indexer.index_all(false, false, |_, _, _| {}).unwrap();

    let path_a = indexer.root().join("a.py");
    let key_a = path_a.to_string_lossy().to_string();
    let key_b = indexer.root().join("b.py").to_string_lossy().to_string();
    let old_a = indexer.journal().get(&key_a).unwrap().clone();
    let old_b = indexer.journal().get(&key_b).unwrap().clone();

    std::fs::write(&a, "x = 42\n").unwrap();
    let outcome = indexer.reconcile_file(&path_a, false);
    assert!(!outcome.skipped);

    let new_a = indexer.journal().get(&key_a).unwrap().clone();
    assert_ne!(new_a.hash, old_a.hash);
    assert_eq!(new_a.hash, content_hash("x = 42\n"));

    // b.py is untouched.
    assert_eq!(indexer.journal().get(&key_b), Some(&old_b));

    let root = indexer.root().to_path_buf();
    drop(indexer);
    let store = open_store(&root);
    for id in &old_a.chunk_ids {
        assert!(store.get(*id).unwrap().is_none(), "old chunk id survived");
    }
    for id in &new_a.chunk_ids {
        assert!(store.get(*id).unwrap().is_some());
    }
    for id in &old_b.chunk_ids {
        assert!(store.get(*id).unwrap().is_some());
    }
}

#[test]
fn gitignored_files_never_reach_the_index() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), ".gitignore", "build/\n");
    write_file(tmp.path(), "build/x.py", "x = 1\n");
    write_file(tmp.path(), "y.py", "y = 2\n");

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    let report = indexer.index_all(false, false, |_, _, _| {}).unwrap();

    assert_eq!(report.indexed, 1);
    assert_eq!(report.total_chunks, 1);
    assert_eq!(indexer.journal().len(), 1);
    assert!(indexer.journal().get(&indexer.root().join("y.py").to_string_lossy().to_string()).is_some());
}

#[test]
fn search_honors_path_prefix_filter() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(
        tmp.path(),
        "src/auth.py",
        "def login(user, password):\n    return check(user, password)\n",
    );
    write_file(
        tmp.path(),
        "src/db.py",
        "def query(sql):\n    return connection.execute(sql)\n",
    );

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    indexer.index_all(false, false, |_, _, _| {}).unwrap();

    let hits = indexer
        .search("authentication", None, Some("src/auth"))
        .unwrap();
    assert!(!hits.is_empty());
    let expected = indexer.root().join("src/auth").to_string_lossy().to_string();
    for hit in &hits {
        assert!(hit.filepath.starts_with(&expected));
    }

    let unfiltered = indexer.search("authentication", None, None).unwrap();
    assert_eq!(unfiltered.len(), 2);
}

#[test]
fn clear_and_reindex_reproduces_the_tree() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "a.py", "x = 1\n");
    write_file(tmp.path(), "src/b.py", "y = 2\n");

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    let first = indexer.index_all(false, false, |_, _, _| {}).unwrap();

    let second = indexer.index_all(true, false, |_, _, _| {}).unwrap();
    assert_eq!(second.indexed, first.indexed);
    assert_eq!(second.total_chunks, first.total_chunks);

    // Journal keys equal the walker's output.
    let walked: Vec<String> = indexer
        .walker()
        .walk()
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    let journaled: Vec<String> = indexer.journal().files().map(|(k, _)| k.clone()).collect();
    assert_eq!(walked, journaled);

    let stats = indexer.stats().unwrap();
    assert_eq!(stats.total_chunks, second.total_chunks as u64);
    assert_eq!(stats.unique_files, 2);
}

#[test]
fn delete_file_purges_store_and_journal() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "a.py", "x = 1\n");

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    indexer.index_all(false, false, |_, _, _| {}).unwrap();

    let path = indexer.root().join("a.py");
    let key = path.to_string_lossy().to_string();
    let ids = indexer.journal().get(&key).unwrap().chunk_ids.clone();

    std::fs::remove_file(&path).unwrap();
    indexer.delete_file(&path).unwrap();
    assert!(indexer.journal().get(&key).is_none());

    let root = indexer.root().to_path_buf();
    drop(indexer);
    let store = open_store(&root);
    assert_eq!(store.count().unwrap(), 0);
    for id in ids {
        assert!(store.get(id).unwrap().is_none());
    }
}

#[test]
fn journal_survives_process_restart() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "a.py", "x = 1\n");

    let embedder = CountingEmbedder::new();
    {
        let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
        indexer.index_all(false, false, |_, _, _| {}).unwrap();
    }
    assert_eq!(embedder.calls(), 1);

    // A fresh process sees the saved journal and does no embedding work.
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    let report = indexer.index_all(false, false, |_, _, _| {}).unwrap();
    assert_eq!(report.indexed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(embedder.calls(), 1);
}

#[test]
fn query_ranks_the_matching_file_first() {
    let tmp = tempfile::tempdir().unwrap();
    write_file(tmp.path(), "greeting.py", "print('hello world')\n");
    write_file(tmp.path(), "farewell.py", "print('goodbye moon')\n");

    let embedder = CountingEmbedder::new();
    let mut indexer = Indexer::open(tmp.path(), &Config::default(), &embedder).unwrap();
    indexer.index_all(false, false, |_, _, _| {}).unwrap();

    // With the histogram embedder, the chunk whose text equals the query
    // embeds to the identical vector and must rank first with distance 0.
    let hits = indexer
        .search("print('hello world')\n", None, None)
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].filepath.ends_with("greeting.py"));
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert!(hits[1].score < hits[0].score);
}
