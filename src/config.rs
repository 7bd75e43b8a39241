//! Configuration: optional JSON file at the repository root, overridden by
//! `WBGREP_*` environment variables, falling back to built-in defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Candidate config filenames at the repository root; first match wins.
pub const CONFIG_FILENAMES: &[&str] = &[".wbgreprc", ".wbgreprc.json", "wbgrep.config.json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub model: String,
    /// Per-request timeout in milliseconds.
    pub timeout: u64,
    /// Attempt budget for network-level failures, counting the first try.
    pub retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3-embedding:0.6b".to_string(),
            timeout: 30_000,
            retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IndexingConfig {
    /// Journal save cadence during a full pass, in files.
    pub batch_size: usize,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
    /// In-flight embedding requests per batch.
    pub concurrency: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_file_size: 1024 * 1024,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchConfig {
    pub max_results: usize,
    pub show_content: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            show_content: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Extra glob patterns added to the global ignore set.
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama: OllamaConfig,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    pub ignore: IgnoreConfig,
}

impl Config {
    /// Load configuration for a repository root.
    ///
    /// A malformed config file is an error; a missing one is not.
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = Self::default();

        for filename in CONFIG_FILENAMES {
            let path = root.join(filename);
            if path.is_file() {
                let raw = std::fs::read_to_string(&path)?;
                config = serde_json::from_str(&raw).map_err(|e| {
                    Error::Config(format!("invalid config file {}: {e}", path.display()))
                })?;
                break;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("WBGREP_BASE_URL") {
            self.ollama.base_url = value;
        }
        if let Ok(value) = std::env::var("WBGREP_MODEL") {
            self.ollama.model = value;
        }
        env_number("WBGREP_TIMEOUT", &mut self.ollama.timeout);
        env_number("WBGREP_RETRIES", &mut self.ollama.retries);
        env_number("WBGREP_BATCH_SIZE", &mut self.indexing.batch_size);
        env_number("WBGREP_MAX_FILE_SIZE", &mut self.indexing.max_file_size);
        env_number("WBGREP_CONCURRENCY", &mut self.indexing.concurrency);
        env_number("WBGREP_MAX_RESULTS", &mut self.search.max_results);
    }
}

fn env_number<T: std::str::FromStr>(name: &str, slot: &mut T) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *slot = value,
        Err(_) => warn!(name, value = %raw, "ignoring unparsable environment override"),
    }
}
