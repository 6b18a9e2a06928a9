//! Indexer: embed a chunk batch and upsert it into the vector store.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::models::{Chunk, IndexEntry};
use crate::vector_store::VectorStore;

/// Writes embedded chunks into the external vector store.
///
/// Shares its [`Embedder`] with the retriever so index entries
/// and queries live in the same embedding space.
pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed and upsert one batch of chunks as a single logical call.
    ///
    /// Reports success as a plain `bool`: `false` on an empty batch (no
    /// store call is made) and on any embedding or store failure, after
    /// logging. The batch is all-or-nothing; there is no per-chunk retry.
    pub async fn index(&self, chunks: &[Chunk]) -> bool {
        if chunks.is_empty() {
            warn!("no chunks to index");
            return false;
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                error!(error = %e, count = chunks.len(), "embedding chunk batch failed");
                return false;
            }
        };

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry {
                id: Uuid::new_v4().to_string(),
                embedding,
                content: chunk.content.clone(),
                source: chunk.source.clone(),
            })
            .collect();

        let count = entries.len();
        if let Err(e) = self.store.upsert(entries).await {
            error!(error = %e, count, "vector store upsert failed");
            return false;
        }

        info!(count, "indexed chunk batch");
        true
    }
}
