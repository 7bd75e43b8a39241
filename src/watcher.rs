//! Watch mode: a debounced filesystem event loop that keeps the index in
//! sync with the working tree.
//!
//! Create/modify events accumulate into a pending set; after the debounce
//! window passes with no further events, the set is drained and each
//! surviving path is reconciled. Deletions are applied immediately. The
//! journal is saved after every flush and once more on shutdown.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::mpsc,
    time::{Duration, Instant},
};

use notify::{Config as NotifyConfig, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::{
    embedding::Embedder,
    error::{Error, Result},
    indexer::Indexer,
};

/// Quiet interval that must pass before pending changes are flushed.
pub const WATCH_DEBOUNCE_MS: u64 = 500;

/// Poll granularity of the event loop.
const POLL_INTERVAL_MS: u64 = 100;

/// Cap on the pending set to bound memory under event storms.
const MAX_PENDING_FILES: usize = 10_000;

/// Build-output directories never worth reindexing on events.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build"];

/// Watch the indexer's root until `should_stop` returns true.
///
/// Existing files are not re-scanned here; the initial full-tree index runs
/// before the watcher is registered, so events raised during that pass are
/// not captured.
pub fn run<E: Embedder>(
    indexer: &mut Indexer<'_, E>,
    should_stop: impl Fn() -> bool,
) -> Result<()> {
    let root = indexer.root().to_path_buf();

    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(tx, NotifyConfig::default())?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching for changes");

    let debounce = Duration::from_millis(WATCH_DEBOUNCE_MS);
    let mut pending: HashSet<PathBuf> = HashSet::new();
    let mut last_event = Instant::now();

    loop {
        match rx.recv_timeout(Duration::from_millis(POLL_INTERVAL_MS)) {
            Ok(Ok(event)) => {
                let removal = matches!(event.kind, EventKind::Remove(_));
                for path in event.paths {
                    if !is_relevant_path(&root, &path) {
                        continue;
                    }
                    if removal {
                        pending.remove(&path);
                        if let Err(e) = indexer.delete_file(&path) {
                            warn!(path = %path.display(), error = %e, "delete failed");
                        }
                    } else {
                        if pending.len() < MAX_PENDING_FILES {
                            pending.insert(path);
                        }
                        last_event = Instant::now();
                    }
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "watch error");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if !pending.is_empty() && last_event.elapsed() >= debounce {
                    let batch: Vec<PathBuf> = pending.drain().collect();
                    debug!(count = batch.len(), "flushing pending changes");
                    flush(indexer, &batch);
                    indexer.save_journal()?;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(Error::Config("file watcher channel disconnected".into()));
            }
        }

        if should_stop() {
            break;
        }
    }

    indexer.save_journal()?;
    info!("watch stopped");
    Ok(())
}

/// Reconcile one debounced batch. Paths that vanished, became ignored, or
/// are not regular files are dropped; per-file errors never stop the loop.
fn flush<E: Embedder>(indexer: &mut Indexer<'_, E>, paths: &[PathBuf]) {
    for path in paths {
        if !path.exists() || indexer.walker().is_ignored(path) || !path.is_file() {
            continue;
        }
        let outcome = indexer.reconcile_file(path, false);
        if let Some(error) = &outcome.error {
            warn!(path = %path.display(), error, "reindex failed");
        } else if !outcome.skipped {
            info!(path = %path.display(), chunks = outcome.chunks, "reindexed");
        }
    }
}

/// Cheap pre-filter applied to raw event paths: everything under a hidden
/// directory (including the index's own `.wb-grep/`) or a conventional
/// build-output directory is dropped before it reaches the pending set.
fn is_relevant_path(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    for component in relative.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.starts_with('.') {
            return false;
        }
        if SKIPPED_DIRS.contains(&name.as_ref()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relevant_path_filtering() {
        let root = Path::new("/repo");
        assert!(is_relevant_path(root, Path::new("/repo/src/main.rs")));
        assert!(!is_relevant_path(root, Path::new("/repo/.wb-grep/state.json")));
        assert!(!is_relevant_path(root, Path::new("/repo/.git/HEAD")));
        assert!(!is_relevant_path(root, Path::new("/repo/node_modules/x/index.js")));
        assert!(!is_relevant_path(root, Path::new("/repo/dist/app.js")));
        assert!(!is_relevant_path(root, Path::new("/repo/build/out.py")));
        assert!(!is_relevant_path(root, Path::new("/repo/src/.cache/x.py")));
        assert!(!is_relevant_path(root, Path::new("/elsewhere/main.rs")));
    }
}
