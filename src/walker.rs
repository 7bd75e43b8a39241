//! Repository traversal with layered ignore rules.
//!
//! A walk honors, in order: the hidden-entry rule (basenames starting with
//! `.`), a global glob set of lock files and build artifacts, `.gitignore` /
//! `.wbgrepignore` files from the repository root down to each entry's
//! directory, and finally the code-extension allowlist.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;

use crate::error::{Error, Result};

/// Glob patterns excluded everywhere, regardless of ignore files.
const GLOBAL_IGNORE_PATTERNS: &[&str] = &[
    "*.lock",
    "*.bin",
    "*.ipynb",
    "*.pyc",
    "*.safetensors",
    "*.sqlite",
    "*.pt",
    "*.whl",
    "*.egg",
    "*.so",
    "*.dll",
    "*.dylib",
    "*.exe",
    "*.o",
    "*.a",
    "*.class",
    "*.jar",
    "*.war",
    "*.min.js",
    "*.min.css",
    "*.map",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
];

/// File extensions accepted as code (or code-adjacent text).
const CODE_EXTENSIONS: &[&str] = &[
    "ts", "tsx", "js", "jsx", "mjs", "cjs", "py", "java", "go", "rs", "c", "cpp", "h", "hpp",
    "cs", "rb", "php", "swift", "kt", "scala", "r", "m", "md", "mdx", "txt", "json", "yaml",
    "yml", "toml", "xml", "html", "css", "scss", "sass", "less", "vue", "svelte", "sql", "sh",
    "bash", "zsh", "fish", "ps1", "bat", "cmd", "dockerfile", "makefile", "cmake", "gradle",
    "tf", "hcl", "proto", "graphql", "prisma",
];

/// Extension-less basenames accepted regardless of the allowlist.
const SPECIAL_BASENAMES: &[&str] =
    &["dockerfile", "makefile", "cmakelists.txt", "gemfile", "rakefile"];

/// Per-repository ignore files honored during a walk.
const IGNORE_FILENAMES: &[&str] = &[".gitignore", ".wbgrepignore"];

/// Walks a repository root, yielding indexable files.
pub struct Walker {
    root: PathBuf,
    global_ignore: GlobSet,
}

impl Walker {
    /// Build a walker for `root` with the global ignore set plus any extra
    /// user-configured patterns.
    pub fn new(root: &Path, extra_patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in GLOBAL_IGNORE_PATTERNS {
            builder.add(
                Glob::new(pattern)
                    .map_err(|e| Error::Config(format!("bad ignore pattern {pattern:?}: {e}")))?,
            );
        }
        for pattern in extra_patterns {
            builder.add(
                Glob::new(pattern)
                    .map_err(|e| Error::Config(format!("bad ignore pattern {pattern:?}: {e}")))?,
            );
        }
        let global_ignore = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to build ignore set: {e}")))?;

        Ok(Self {
            root: root.to_path_buf(),
            global_ignore,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and return the absolute paths of all indexable files,
    /// in sorted order.
    ///
    /// Unreadable directories are skipped; permission errors never fail a
    /// walk.
    pub fn walk(&self) -> Vec<PathBuf> {
        let mut cache = MatcherCache::default();
        let mut results = Vec::new();
        self.walk_dir(&self.root, &mut cache, &mut results);
        results.sort();
        results
    }

    fn walk_dir(&self, dir: &Path, cache: &mut MatcherCache, results: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }

            if self.global_ignore.is_match(Path::new(name.as_ref())) {
                continue;
            }

            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_dir() {
                if !self.matches_ignore_files(&path, true, cache) {
                    self.walk_dir(&path, cache, results);
                }
            } else if file_type.is_file()
                && is_code_file(&path)
                && !self.matches_ignore_files(&path, false, cache)
            {
                results.push(path);
            }
        }
    }

    /// Whether a single path would be excluded from a walk. Used by the
    /// watcher to filter event paths against the same rules.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        for component in relative.components() {
            let name = component.as_os_str().to_string_lossy();
            if name.starts_with('.') {
                return true;
            }
            if self.global_ignore.is_match(Path::new(name.as_ref())) {
                return true;
            }
        }
        if !is_code_file(path) {
            return true;
        }
        let mut cache = MatcherCache::default();
        self.matches_ignore_files(path, false, &mut cache)
    }

    /// Apply `.gitignore` / `.wbgrepignore` files from the root down to the
    /// path's parent. Deeper files override shallower ones, and whitelist
    /// patterns (`!pattern`) un-ignore.
    fn matches_ignore_files(&self, path: &Path, is_dir: bool, cache: &mut MatcherCache) -> bool {
        let mut ancestors: Vec<&Path> = path
            .ancestors()
            .skip(1)
            .take_while(|a| a.starts_with(&self.root))
            .collect();
        ancestors.reverse();

        let mut ignored = false;
        for dir in ancestors {
            let Some(matcher) = cache.matcher_for(dir) else {
                continue;
            };
            let matched = matcher.matched_path_or_any_parents(path, is_dir);
            if matched.is_ignore() {
                ignored = true;
            } else if matched.is_whitelist() {
                ignored = false;
            }
        }
        ignored
    }
}

/// Ignore files are parsed once per directory and reused for the walk.
#[derive(Default)]
struct MatcherCache {
    matchers: HashMap<PathBuf, Option<Gitignore>>,
}

impl MatcherCache {
    fn matcher_for(&mut self, dir: &Path) -> Option<&Gitignore> {
        self.matchers
            .entry(dir.to_path_buf())
            .or_insert_with(|| build_matcher(dir))
            .as_ref()
    }
}

fn build_matcher(dir: &Path) -> Option<Gitignore> {
    let mut found = false;
    let mut builder = GitignoreBuilder::new(dir);
    for filename in IGNORE_FILENAMES {
        let file = dir.join(filename);
        if file.is_file() {
            let _ = builder.add(file);
            found = true;
        }
    }
    if !found {
        return None;
    }
    builder.build().ok()
}

/// Whether a file qualifies by extension or special basename.
fn is_code_file(path: &Path) -> bool {
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if SPECIAL_BASENAMES.contains(&basename.as_str()) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext.as_str()))
}
