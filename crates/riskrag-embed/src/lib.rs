//! Offline scoring models: a feature-hashing [`HashingEmbedder`] and a
//! [`TermOverlapReranker`].
//!
//! Neither needs model weights, which keeps ingestion and tests deterministic and
//! fast. Production deployments plug their own [`Embedder`]/[`Reranker`] in.
use anyhow::Result;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use twox_hash::XxHash64;

use riskrag_core::traits::Embedder;

pub mod rerank;

pub use rerank::TermOverlapReranker;

/// Buckets lower-cased alphanumeric tokens by xxHash64 into `dim` slots and
/// L2-normalizes the result. A token weighs the same wherever it appears, and
/// identical input always yields the identical vector.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder { dim: usize }

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in tokens(text) {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += 0.5 + val;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashingEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

pub fn default_embedder(dim: usize) -> Arc<dyn Embedder> {
    tracing::info!(dim, "using hashing embedder");
    Arc::new(HashingEmbedder::new(dim))
}
