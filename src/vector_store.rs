//! External vector store abstraction.
//!
//! The index is owned by an external nearest-neighbor service; this
//! crate only appends entries and runs similarity searches. Two backends
//! implement [`VectorStore`]:
//!
//! - [`QdrantStore`] — the production backend, talking to Qdrant's REST
//!   API over the shared `reqwest` stack.
//! - [`MemoryStore`] — an in-process cosine-similarity store for
//!   development and tests.
//!
//! Use [`create_store`] to instantiate the backend named in the
//! `[vector_store]` config section.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::VectorStoreConfig;
use crate::models::{IndexEntry, SearchHit};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the backing collection if it does not exist yet.
    async fn ensure_collection(&self, dims: usize) -> Result<()>;

    /// Append a batch of entries in one logical call.
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()>;

    /// Return the `k` nearest entries by similarity, best first.
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;
}

/// Instantiate the configured backend.
pub fn create_store(config: &VectorStoreConfig) -> Result<Arc<dyn VectorStore>> {
    match config.provider.as_str() {
        "qdrant" => Ok(Arc::new(QdrantStore::new(config)?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => bail!("Unknown vector store provider: {}", other),
    }
}

// ============ Qdrant (REST) ============

/// Qdrant backend over its HTTP API.
///
/// Entries are stored as points with the chunk text and source filename
/// in the payload; collections use cosine distance.
pub struct QdrantStore {
    http: reqwest::Client,
    url: String,
    collection: String,
}

impl QdrantStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.url, self.collection)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        let exists = self
            .http
            .get(self.collection_url())
            .send()
            .await
            .context("vector store unreachable")?
            .status()
            .is_success();
        if exists {
            return Ok(());
        }

        let body = serde_json::json!({
            "vectors": { "size": dims, "distance": "Cosine" }
        });
        let response = self
            .http
            .put(self.collection_url())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("failed to create collection ({}): {}", status, text);
        }
        debug!(collection = %self.collection, dims, "created vector store collection");
        Ok(())
    }

    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let points: Vec<serde_json::Value> = entries
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "id": entry.id,
                    "vector": entry.embedding,
                    "payload": { "text": entry.content, "source": entry.source }
                })
            })
            .collect();

        let response = self
            .http
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&serde_json::json!({ "points": points }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("vector store upsert failed ({}): {}", status, text);
        }
        debug!(count = entries.len(), collection = %self.collection, "upserted index entries");
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "vector": vector,
            "limit": k,
            "with_payload": true
        });
        let response = self
            .http
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("vector store search failed ({}): {}", status, text);
        }

        let json: serde_json::Value = response.json().await?;
        let rows = json
            .get("result")
            .and_then(|r| r.as_array())
            .context("invalid search response: missing result array")?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let payload = row.get("payload");
            let text = payload
                .and_then(|p| p.get("text"))
                .and_then(|t| t.as_str())
                .unwrap_or_default();
            let source = payload
                .and_then(|p| p.get("source"))
                .and_then(|s| s.as_str())
                .unwrap_or_default();
            let score = row.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32;
            hits.push(SearchHit {
                content: text.to_string(),
                source: source.to_string(),
                score,
            });
        }
        Ok(hits)
    }
}

// ============ In-memory ============

/// In-process store ranking entries by cosine similarity. Append-only,
/// like the real backend; safe for concurrent use via `RwLock`.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<IndexEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, _dims: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, mut new_entries: Vec<IndexEntry>) -> Result<()> {
        self.entries.write().await.append(&mut new_entries);
        Ok(())
    }

    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let entries = self.entries.read().await;
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .map(|entry| SearchHit {
                content: entry.content.clone(),
                source: entry.source.clone(),
                score: cosine_similarity(&entry.embedding, vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Cosine similarity between two vectors. Returns `0.0` for empty or
/// mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}
