use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;

/// Text → fixed-dimension vector. Must be deterministic for identical input.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// Pairwise (query, passage) relevance; higher is more relevant.
pub trait Reranker: Send + Sync {
    fn score(&self, query: &str, passage: &str) -> anyhow::Result<f32>;
}

/// Pulls filings for a ticker into local files named `TICKER_FORM_DATE.ext`.
///
/// An empty result is legitimate. Network problems come back as
/// [`crate::Error::FetchFailure`].
#[async_trait]
pub trait FilingFetcher: Send + Sync {
    async fn fetch(&self, ticker: &str, count: usize) -> Result<Vec<PathBuf>>;
}
