//! Ingestion pipeline: files in, indexed chunks out.
//!
//! Extraction, chunking, and indexing run as one synchronous pass over a
//! batch of files. Failures are attributed to the stage that produced
//! them so an operator can tell a corrupt upload from an unreachable
//! vector store.

use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::info;

use crate::chunk::split_documents;
use crate::config::{ChunkingConfig, UnknownFileMode};
use crate::extract::extract_file;
use crate::index::Indexer;
use crate::models::Document;

/// What one ingestion batch accomplished.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_extracted: usize,
    pub chunks_indexed: usize,
}

pub struct IngestPipeline {
    indexer: Indexer,
    chunking: ChunkingConfig,
    unknown_files: UnknownFileMode,
}

impl IngestPipeline {
    pub fn new(indexer: Indexer, chunking: ChunkingConfig, unknown_files: UnknownFileMode) -> Self {
        Self {
            indexer,
            chunking,
            unknown_files,
        }
    }

    /// Extract, chunk, and index a batch of files as one unit.
    ///
    /// Files that fail extraction are skipped individually; the batch as
    /// a whole errors only when nothing survives a stage, or when the
    /// index write fails.
    pub async fn ingest_files(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let mut report = IngestReport {
            files_seen: paths.len(),
            ..Default::default()
        };

        let mut documents: Vec<Document> = Vec::new();
        for path in paths {
            if let Some(document) = extract_file(path, self.unknown_files) {
                documents.push(document);
                report.files_extracted += 1;
            }
        }
        if documents.is_empty() {
            bail!("extraction produced no documents from {} file(s)", paths.len());
        }

        let chunks = split_documents(
            &documents,
            self.chunking.max_chars,
            self.chunking.overlap_chars,
        );
        if chunks.is_empty() {
            bail!("chunking produced no chunks; the extracted documents were empty");
        }

        if !self.indexer.index(&chunks).await {
            bail!("indexing failed; see logs for the embedding or store error");
        }

        report.chunks_indexed = chunks.len();
        info!(
            files = report.files_extracted,
            chunks = report.chunks_indexed,
            "ingestion batch complete"
        );
        Ok(report)
    }
}
