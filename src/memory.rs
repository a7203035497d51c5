//! Long-term chat memory: text fragments searchable by embedding similarity.
//!
//! [`MemoryStore`] is the seam the chat responder depends on. The production
//! store, [`VectorMemory`], keeps records in memory and mirrors them to a JSON
//! file inside the configured memory directory. Embeddings come from an
//! [`Embedder`]; [`OpenAiEmbedder`] calls the OpenAI embeddings API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::MemoryError;

/// File name of the persisted store inside the memory directory.
pub const MEMORY_FILE: &str = "memory.json";

/// Embedding model used when none is configured.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

// ============================================================================
// Embeddings
// ============================================================================

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed every input, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError>;
}

/// Client for the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        if body.data.len() != texts.len() {
            return Err(MemoryError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.data.len()
            )));
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ============================================================================
// Store
// ============================================================================

/// One remembered fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: u64,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A similarity-searchable store of text fragments.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Append fragments. Existing records are never modified.
    async fn add_texts(&self, texts: &[String]) -> Result<(), MemoryError>;

    /// The `k` records most similar to `query`, most similar first.
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Remove every record.
    ///
    /// The store is empty afterwards even when an error is returned; the
    /// error only reports that persisted data could not be removed.
    async fn clear(&self) -> Result<(), MemoryError>;
}

/// Embedding store held in memory and mirrored to `memory.json`.
pub struct VectorMemory {
    embedder: Arc<dyn Embedder>,
    path: Option<PathBuf>,
    records: RwLock<Vec<MemoryRecord>>,
}

impl VectorMemory {
    /// Open (or create) the store persisted in `dir`.
    pub fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, MemoryError> {
        std::fs::create_dir_all(dir).map_err(storage_err)?;
        let path = dir.join(MEMORY_FILE);

        let records = if path.exists() {
            let bytes = std::fs::read(&path).map_err(storage_err)?;
            serde_json::from_slice(&bytes)
                .map_err(|e| MemoryError::Storage(format!("{}: {e}", path.display())))?
        } else {
            Vec::new()
        };

        Ok(Self {
            embedder,
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            path: None,
            records: RwLock::new(Vec::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn persist(&self, records: &[MemoryRecord]) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(records)
            .map_err(|e| MemoryError::Internal(format!("serialize error: {e}")))?;
        tokio::fs::write(path, bytes).await.map_err(storage_err)
    }
}

#[async_trait]
impl MemoryStore for VectorMemory {
    async fn add_texts(&self, texts: &[String]) -> Result<(), MemoryError> {
        let embeddings = self.embedder.embed(texts).await?;

        let mut records = self.records.write().await;
        let mut next_id = records.last().map_or(0, |r| r.id + 1);
        let mut updated = records.clone();
        for (text, embedding) in texts.iter().zip(embeddings) {
            updated.push(MemoryRecord {
                id: next_id,
                text: text.clone(),
                embedding,
            });
            next_id += 1;
        }

        // Commit only what reached disk.
        self.persist(&updated).await?;
        *records = updated;
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        if k == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| MemoryError::Embedding("no embedding for query".into()))?;

        let records = self.records.read().await;
        let mut scored: Vec<(f32, &MemoryRecord)> = records
            .iter()
            .map(|r| (cosine_similarity(&query_embedding, &r.embedding), r))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        debug!(candidates = scored.len(), k, "memory search");
        Ok(scored.into_iter().take(k).map(|(_, r)| r.clone()).collect())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.records.write().await.clear();

        match &self.path {
            Some(path) => match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(storage_err(e)),
            },
            None => Ok(()),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn storage_err(err: std::io::Error) -> MemoryError {
    MemoryError::Storage(err.to_string())
}

// ============================================================================
// Mock Embedder (Test Only)
// ============================================================================

/// Deterministic bag-of-words embedder. Texts sharing words score higher.
#[cfg(test)]
pub struct HashEmbedder {
    pub calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
        use std::hash::{Hash, Hasher};

        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 256];
                for word in text.to_lowercase().split_whitespace() {
                    let mut hasher = std::collections::hash_map::DefaultHasher::new();
                    word.hash(&mut hasher);
                    v[(hasher.finish() % 256) as usize] += 1.0;
                }
                v
            })
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
