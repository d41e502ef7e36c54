//! riskrag-text
//!
//! Tantivy-backed BM25 scoring over the corpus texts. The index lives in RAM and is
//! rebuilt from scratch after every ingestion batch; see [`SparseIndex`].
pub mod tantivy_utils;
pub mod index;

pub use index::SparseIndex;
