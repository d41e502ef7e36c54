use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use riskrag_core::chunker::{list_filings, read_document, Chunker};
use riskrag_core::error::{Error, Result};
use riskrag_core::traits::Embedder;
use riskrag_core::types::{LabeledChunk, RawDocument};

use riskrag_text::SparseIndex;

use crate::retriever::{build_sparse_or_unbuilt, embed_texts, SharedState};

/// Chunks documents, embeds the chunks and appends them to the corpus as one batch.
pub struct Ingestor {
    state: SharedState,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
}

impl Ingestor {
    pub fn new(state: SharedState, embedder: Arc<dyn Embedder>, chunker: Chunker) -> Self {
        Self { state, embedder, chunker }
    }

    pub fn chunker(&self) -> &Chunker { &self.chunker }

    /// Returns the number of passages appended. No documents, or documents that
    /// yield no chunk, append nothing and return 0.
    pub async fn ingest_documents(&self, docs: &[RawDocument]) -> Result<usize> {
        let chunks = self.chunker.chunk_documents(docs);
        info!(documents = docs.len(), chunks = chunks.len(), "chunked documents");
        self.ingest_chunks(chunks).await
    }

    /// Embed before taking the write lock, then append, persist and rebuild the
    /// sparse index while holding it. A batch that fails to persist is rolled back
    /// before the lock is released, so readers never see it.
    pub async fn ingest_chunks(&self, chunks: Vec<LabeledChunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        let (texts, metadatas): (Vec<String>, Vec<_>) = chunks.into_iter().map(|c| (c.text, c.metadata)).unzip();
        let vectors = embed_texts(&self.embedder, texts.clone()).await?;

        let mut state = self.state.write().await;
        let ids = state.corpus.append_batch(texts, Some(metadatas), vectors).await?;
        let committed = ids.start as usize;
        let writer = state.corpus.side_record();
        let persisted = tokio::task::spawn_blocking(move || writer.write())
            .await
            .map_err(|e| Error::Storage(e.to_string()))
            .and_then(|r| r);
        if let Err(e) = persisted {
            warn!(error = %e, "persist failed; rolling batch back");
            if let Err(rollback) = state.corpus.rollback_to(committed).await {
                warn!(error = %rollback, "rollback incomplete; uncommitted rows are dropped on next restore");
            }
            return Err(e);
        }
        let texts = state.corpus.texts().to_vec();
        state.sparse = tokio::task::spawn_blocking(move || build_sparse_or_unbuilt(&texts))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "sparse rebuild task failed");
                SparseIndex::unbuilt()
            });
        let appended = (ids.end - ids.start) as usize;
        info!(
            appended,
            total = state.corpus.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion batch committed"
        );
        Ok(appended)
    }

    /// Read and ingest exactly `paths`. Unreadable files are skipped with a warning.
    pub async fn ingest_files(&self, paths: &[PathBuf]) -> Result<usize> {
        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            match read_document(path) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable filing"),
            }
        }
        self.ingest_documents(&docs).await
    }

    /// Like [`Ingestor::ingest_files`], skipping files whose name is already the
    /// `source` of a stored passage.
    pub async fn ingest_new_files(&self, paths: &[PathBuf]) -> Result<usize> {
        let fresh: Vec<PathBuf> = {
            let state = self.state.read().await;
            paths
                .iter()
                .filter(|p| {
                    let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                    let known = state.corpus.has_source(&name);
                    if known {
                        info!(source = %name, "filing already ingested; skipping");
                    }
                    !known
                })
                .cloned()
                .collect()
        };
        self.ingest_files(&fresh).await
    }

    pub async fn ingest_directory(&self, dir: &Path) -> Result<usize> {
        let files = list_filings(dir);
        self.ingest_files(&files).await
    }
}
