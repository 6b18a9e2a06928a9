//! End-to-end ingestion and retrieval over the in-memory vector store.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use docchat::config::{ChunkingConfig, UnknownFileMode};
use docchat::embedding::Embedder;
use docchat::index::Indexer;
use docchat::ingest::IngestPipeline;
use docchat::models::{Chunk, IndexEntry, SearchHit};
use docchat::retrieve::{Retriever, ERROR_SENTINEL, NO_MATCH_SENTINEL};
use docchat::vector_store::{MemoryStore, VectorStore};

/// Deterministic embedder: one dimension per vocabulary word, valued by
/// how often the word occurs. Texts about the same topic land close
/// together under cosine similarity.
struct VocabEmbedder {
    vocab: Vec<&'static str>,
}

impl VocabEmbedder {
    fn new() -> Self {
        Self {
            vocab: vec!["rust", "cargo", "python", "torch"],
        }
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    fn dims(&self) -> usize {
        self.vocab.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                self.vocab
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect()
            })
            .collect())
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dims(&self) -> usize {
        4
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embedding service unreachable")
    }
}

/// Store wrapper that counts upserts, to prove empty batches never reach
/// the backend.
struct CountingStore {
    inner: MemoryStore,
    upserts: AtomicUsize,
}

#[async_trait]
impl VectorStore for CountingStore {
    async fn ensure_collection(&self, dims: usize) -> Result<()> {
        self.inner.ensure_collection(dims).await
    }
    async fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(entries).await
    }
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.inner.search(vector, k).await
    }
}

fn write_corpus(dir: &TempDir) -> Vec<PathBuf> {
    let alpha = dir.path().join("alpha.txt");
    std::fs::write(
        &alpha,
        "Rust programming with cargo. Rust crates are built by cargo.",
    )
    .unwrap();
    let beta = dir.path().join("beta.txt");
    std::fs::write(
        &beta,
        "Python machine learning. Deep learning with torch in python.",
    )
    .unwrap();
    vec![alpha, beta]
}

fn pipeline(
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    mode: UnknownFileMode,
) -> IngestPipeline {
    IngestPipeline::new(
        Indexer::new(embedder, store),
        ChunkingConfig {
            max_chars: 1000,
            overlap_chars: 200,
        },
        mode,
    )
}

#[tokio::test]
async fn ingest_then_retrieve_finds_the_right_document() {
    let dir = TempDir::new().unwrap();
    let files = write_corpus(&dir);

    let embedder: Arc<dyn Embedder> = Arc::new(VocabEmbedder::new());
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

    let report = pipeline(embedder.clone(), store.clone(), UnknownFileMode::Lenient)
        .ingest_files(&files)
        .await
        .unwrap();
    assert_eq!(report.files_seen, 2);
    assert_eq!(report.files_extracted, 2);
    assert_eq!(report.chunks_indexed, 2);

    let retriever = Retriever::new(embedder, store, 1);
    let context = retriever.retrieve("tell me about rust and cargo").await;
    assert!(context.contains("cargo"), "got: {}", context);
    assert!(!context.contains("torch"), "got: {}", context);
}

#[tokio::test]
async fn retrieval_from_an_empty_store_returns_the_no_match_sentinel() {
    let embedder: Arc<dyn Embedder> = Arc::new(VocabEmbedder::new());
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

    let retriever = Retriever::new(embedder, store, 4);
    assert_eq!(retriever.retrieve("anything").await, NO_MATCH_SENTINEL);
}

#[tokio::test]
async fn embedding_failure_surfaces_as_the_error_sentinel() {
    let embedder: Arc<dyn Embedder> = Arc::new(FailingEmbedder);
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

    let retriever = Retriever::new(embedder, store, 4);
    assert_eq!(retriever.retrieve("anything").await, ERROR_SENTINEL);
}

#[tokio::test]
async fn strict_mode_batch_of_unsupported_files_fails_at_extraction() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("photo.png");
    std::fs::write(&path, [0u8, 1, 2]).unwrap();

    let embedder: Arc<dyn Embedder> = Arc::new(VocabEmbedder::new());
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

    let err = pipeline(embedder, store, UnknownFileMode::Strict)
        .ingest_files(&[path])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("extraction"), "got: {}", err);
}

#[tokio::test]
async fn lenient_mode_empty_documents_fail_at_chunking() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("photo.png");
    std::fs::write(&path, [0u8, 1, 2]).unwrap();

    let embedder: Arc<dyn Embedder> = Arc::new(VocabEmbedder::new());
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

    let err = pipeline(embedder, store, UnknownFileMode::Lenient)
        .ingest_files(&[path])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("chunk"), "got: {}", err);
}

#[tokio::test]
async fn empty_chunk_batch_never_reaches_the_store() {
    let embedder: Arc<dyn Embedder> = Arc::new(VocabEmbedder::new());
    let store = Arc::new(CountingStore {
        inner: MemoryStore::new(),
        upserts: AtomicUsize::new(0),
    });

    let indexer = Indexer::new(embedder, store.clone());
    let chunks: Vec<Chunk> = Vec::new();
    assert!(!indexer.index(&chunks).await);
    assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_file_is_skipped_but_the_batch_survives() {
    let dir = TempDir::new().unwrap();
    let mut files = write_corpus(&dir);
    let broken = dir.path().join("broken.pdf");
    std::fs::write(&broken, b"not a pdf").unwrap();
    files.push(broken);

    let embedder: Arc<dyn Embedder> = Arc::new(VocabEmbedder::new());
    let store: Arc<dyn VectorStore> = Arc::new(MemoryStore::new());

    let report = pipeline(embedder, store, UnknownFileMode::Lenient)
        .ingest_files(&files)
        .await
        .unwrap();
    assert_eq!(report.files_seen, 3);
    assert_eq!(report.files_extracted, 2);
    assert_eq!(report.chunks_indexed, 2);
}
