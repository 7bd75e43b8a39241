//! Embedding backend client.
//!
//! Text is converted to fixed-dimension vectors by an Ollama-compatible HTTP
//! service. Network-level failures are retried with exponential backoff;
//! HTTP error responses are not. Batch embedding fans out over a bounded
//! number of worker threads and substitutes a zero vector for per-item
//! failures, so one flaky request does not lose a whole file.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    config::OllamaConfig,
    error::{Error, Result},
};

/// Expected embedding dimension of the default model.
pub const EMBEDDING_DIM: usize = 1024;

const BASE_BACKOFF_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 10_000;

/// Anything that can turn text into vectors.
///
/// The indexer is generic over this seam; tests substitute a deterministic
/// in-process implementation.
pub trait Embedder: Sync {
    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a single text, blocking.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch with at most `concurrency` requests in flight.
    ///
    /// Length-preserving: result `i` corresponds to input `i`. A failed item
    /// is recorded and replaced with a zero vector; only when every item
    /// fails does the batch fail as a whole, reporting the first underlying
    /// error.
    fn embed_batch(&self, texts: &[String], concurrency: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let next = AtomicUsize::new(0);
        let workers = concurrency.clamp(1, texts.len());

        let gathered: Vec<(usize, Result<Vec<f32>>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(|| {
                        let mut local = Vec::new();
                        loop {
                            let i = next.fetch_add(1, Ordering::Relaxed);
                            if i >= texts.len() {
                                break;
                            }
                            local.push((i, self.embed(&texts[i])));
                        }
                        local
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_default())
                .collect()
        });

        let mut slots: Vec<Option<Result<Vec<f32>>>> = (0..texts.len()).map(|_| None).collect();
        for (i, result) in gathered {
            slots[i] = Some(result);
        }

        let mut out = Vec::with_capacity(texts.len());
        let mut first_error = None;
        let mut failures = 0;
        for (i, slot) in slots.into_iter().enumerate() {
            let result =
                slot.unwrap_or_else(|| Err(Error::Embedding("embedding worker died".into())));
            match result {
                Ok(vector) => out.push(vector),
                Err(e) => {
                    warn!(index = i, error = %e, "embedding failed, substituting zero vector");
                    failures += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    out.push(vec![0.0; self.dimension()]);
                }
            }
        }

        match first_error {
            Some(e) if failures == texts.len() => Err(e),
            _ => Ok(out),
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Outcome of one HTTP attempt.
enum AttemptError {
    /// Network-level failure; eligible for retry.
    Retryable(String),
    /// Definitive failure (HTTP error body, malformed response); not retried.
    Fatal(Error),
}

/// Blocking client for an Ollama-compatible embedding service.
pub struct OllamaClient {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    retries: u32,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout))
            .build();
        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            retries: config.retries.max(1),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the backend answers at all.
    pub fn ping(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        self.agent.get(&url).call().is_ok()
    }

    /// Whether the backend advertises the configured model, either exactly
    /// or by base name (everything before the first `:`).
    pub fn has_model(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        let response = match self.agent.get(&url).call() {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "model listing failed");
                return false;
            }
        };
        let tags: TagsResponse = match response.into_json() {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "model listing unparsable");
                return false;
            }
        };

        let base = self.model.split(':').next().unwrap_or(&self.model);
        tags.models
            .iter()
            .any(|m| m.name == self.model || m.name.starts_with(base))
    }

    fn attempt_embedding(&self, prompt: &str) -> std::result::Result<Vec<f32>, AttemptError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = serde_json::json!({ "model": self.model, "prompt": prompt }).to_string();

        let response = self
            .agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body);

        match response {
            Ok(resp) => {
                let raw = resp
                    .into_string()
                    .map_err(|e| AttemptError::Retryable(e.to_string()))?;
                let parsed: EmbeddingResponse = serde_json::from_str(&raw).map_err(|e| {
                    AttemptError::Fatal(Error::Embedding(format!(
                        "unexpected embedding response: {e}"
                    )))
                })?;
                Ok(parsed.embedding)
            }
            Err(ureq::Error::Status(code, resp)) => Err(AttemptError::Fatal(Error::Protocol {
                status: code,
                body: resp.into_string().unwrap_or_default(),
            })),
            Err(ureq::Error::Transport(t)) => Err(AttemptError::Retryable(t.to_string())),
        }
    }
}

/// Delay before attempt `k` (1-based): 1s, 2s, 4s... capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(2).min(16);
    Duration::from_millis((BASE_BACKOFF_MS << exp).min(MAX_BACKOFF_MS))
}

impl Embedder for OllamaClient {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut last = String::new();
        for attempt in 1..=self.retries {
            if attempt > 1 {
                thread::sleep(backoff_delay(attempt));
            }
            match self.attempt_embedding(text) {
                Ok(vector) => return Ok(vector),
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Retryable(message)) => {
                    warn!(attempt, error = %message, "embedding request failed");
                    last = message;
                }
            }
        }
        Err(Error::Backend {
            attempts: self.retries,
            last,
        })
    }
}
