use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy shared by every crate in the workspace.
///
/// Only [`Error::ShapeMismatch`] and [`Error::CorpusCorruption`] are meant to reach
/// a caller of retrieval as hard failures; the rest are recovered where they occur
/// (see [`Error::is_fatal`]).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Shape mismatch: {texts} texts, {metadatas} metadatas, {vectors} vectors")]
    ShapeMismatch { texts: usize, metadatas: usize, vectors: usize },

    #[error("Corpus corruption: {0}")]
    CorpusCorruption(String),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(&'static str),

    #[error("Fetch failed: {0}")]
    FetchFailure(String),

    #[error("Reranker unavailable; falling back to dense-then-sparse order")]
    RerankUnavailable,

    #[error("Backfill timed out after {0:?}")]
    BackfillTimeout(Duration),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that invalidate a whole ingestion batch or the loaded corpus.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ShapeMismatch { .. } | Error::CorpusCorruption(_))
    }

    pub fn storage(e: impl std::fmt::Display) -> Self {
        Error::Storage(e.to_string())
    }

    pub fn fetch(e: impl std::fmt::Display) -> Self {
        Error::FetchFailure(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
