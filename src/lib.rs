//! wbgrep -- semantic code search for a local repository.
//!
//! wbgrep indexes a source tree into an on-disk vector store and answers
//! natural-language queries with the most semantically similar code regions.
//! Embeddings come from an Ollama-compatible HTTP backend; everything else
//! is local.
//!
//! # Architecture
//!
//! The index path walks the repository, chunks each file into line-bounded
//! regions, embeds the chunks with bounded concurrency, and records the
//! result in two stores that must agree:
//!
//! - **`.wb-grep/vectors/`** ([`VectorStore`]) -- chunk rows
//!   `{id, filepath, content, lines, vector, hash, timestamp}` in redb
//! - **`.wb-grep/state.json`** ([`StateJournal`]) -- per-file content hashes
//!   and chunk ids, used for change detection
//!
//! A per-file *reconcile* deletes the previous generation of chunks by id,
//! inserts fresh rows under new random ids, and only then replaces the
//! journal entry; failures leave the journal untouched so the next pass
//! retries. Watch mode drives reconciles from debounced filesystem events.
//!
//! The query path embeds the query text once and scans the store under a
//! read snapshot, scoring rows by `1 / (1 + distance)`.
//!
//! # Quick start
//!
//! ```no_run
//! use wbgrep::{Config, Indexer, OllamaClient};
//!
//! let root = std::path::Path::new(".");
//! let config = Config::load(root).unwrap();
//! let client = OllamaClient::new(&config.ollama);
//!
//! let mut indexer = Indexer::open(root, &config, &client).unwrap();
//! let report = indexer.index_all(false, false, |_, _, _| {}).unwrap();
//! println!("indexed {} files", report.indexed);
//!
//! for hit in indexer.search("where is authentication handled", None, None).unwrap() {
//!     println!("[{:.3}] {}:{}-{}", hit.score, hit.filepath, hit.line_start, hit.line_end);
//! }
//! ```

pub mod chunk_id;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod data_dir;
pub mod embedding;
pub mod error;
pub mod indexer;
pub mod search;
pub mod state;
pub mod vector_store;
pub mod walker;
pub mod watcher;

pub use chunk_id::ChunkId;
pub use config::Config;
pub use data_dir::DataDir;
pub use embedding::{Embedder, OllamaClient};
pub use error::{Error, Result};
pub use indexer::{IndexReport, Indexer, ReconcileOutcome};
pub use state::StateJournal;
pub use vector_store::{ChunkRecord, SearchHit, VectorStore};
pub use walker::Walker;
