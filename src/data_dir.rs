use std::path::{Path, PathBuf};

use crate::error::Result;

/// On-disk layout of the index, rooted at `<repo>/.wb-grep/`.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the index directory for a repository root, creating it if
    /// needed.
    pub fn resolve(repo_root: &Path) -> Result<Self> {
        let root = repo_root.join(".wb-grep");
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory managed by the vector store.
    pub fn vectors_dir(&self) -> PathBuf {
        self.root.join("vectors")
    }

    /// The redb database file inside the vectors directory.
    pub fn vectors_db(&self) -> PathBuf {
        self.vectors_dir().join("chunks.redb")
    }

    /// The journal snapshot.
    pub fn state_file(&self) -> PathBuf {
        self.root.join("state.json")
    }
}
