//! Hybrid retrieval over the passage corpus.
//!
//! Dense (L2) and sparse (BM25) candidates are fused, optionally reranked, and
//! returned as passage texts. [`RiskContext`] wires the retriever, the ingestor and
//! the backfill controller around one shared [`IndexState`].

pub mod backfill;
pub mod ingest;
pub mod retriever;
pub mod service;

pub use backfill::{placeholder, BackfillController, BackfillState, Evidence, PlaceholderCause, PLACEHOLDER_SENTINEL};
pub use ingest::Ingestor;
pub use retriever::{Candidate, HybridRetriever, IndexState, SharedState};
pub use service::RiskContext;
