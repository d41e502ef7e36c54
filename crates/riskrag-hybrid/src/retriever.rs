use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use riskrag_core::error::{Error, Result};
use riskrag_core::traits::{Embedder, Reranker};
use riskrag_core::types::{Filter, PassageId, SearchHit, SourceKind};
use riskrag_text::SparseIndex;
use riskrag_vector::Corpus;

/// Corpus and the sparse index derived from it. Always locked together so a
/// search never sees one updated without the other.
pub struct IndexState {
    pub corpus: Corpus,
    pub sparse: SparseIndex,
}

impl IndexState {
    /// Wrap a restored corpus, building the sparse index over its texts.
    pub fn new(corpus: Corpus) -> Self {
        let sparse = build_sparse_or_unbuilt(corpus.texts());
        Self { corpus, sparse }
    }
}

pub(crate) fn build_sparse_or_unbuilt(texts: &[String]) -> SparseIndex {
    match SparseIndex::build(texts) {
        Ok(index) => index,
        Err(e) => {
            warn!(error = %e, "sparse index rebuild failed; lexical search disabled until next ingestion");
            SparseIndex::unbuilt()
        }
    }
}

pub type SharedState = Arc<RwLock<IndexState>>;

/// Run the embedder off the async runtime.
pub(crate) async fn embed_texts(embedder: &Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| Error::Embedding(e.to_string()))?
        .map_err(|e| Error::Embedding(format!("{e:#}")))
}

pub struct HybridRetriever {
    state: SharedState,
    embedder: Arc<dyn Embedder>,
    reranker: Option<Arc<dyn Reranker>>,
    over_fetch_factor: usize,
}

impl HybridRetriever {
    pub fn new(
        state: SharedState,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        over_fetch_factor: usize,
    ) -> Self {
        if reranker.is_none() {
            info!("{}", Error::RerankUnavailable);
        }
        Self { state, embedder, reranker, over_fetch_factor: over_fetch_factor.max(1) }
    }

    /// At most `top_k` passage texts relevant to `query` whose metadata matches `filter`.
    ///
    /// A failing strategy (embedding, dense or sparse search) is logged and skipped;
    /// the other still contributes.
    pub async fn retrieve(&self, query: &str, top_k: usize, filter: &Filter) -> Vec<String> {
        let fused: Vec<String> = self.candidates(query, top_k, filter).await.into_iter().map(|c| c.text).collect();
        if let Some(mut ranked) = self.reranker.as_deref().and_then(|r| rerank(r, query, &fused)) {
            ranked.truncate(top_k);
            return ranked;
        }
        fused.into_iter().take(top_k).collect()
    }

    /// Fused candidates before reranking: dense hits in distance order, then sparse
    /// hits not already present. Up to `top_k` from each strategy.
    pub async fn candidates(&self, query: &str, top_k: usize, filter: &Filter) -> Vec<Candidate> {
        if top_k == 0 {
            return Vec::new();
        }
        let query_vector = match embed_texts(&self.embedder, vec![query.to_string()]).await {
            Ok(mut v) => v.pop(),
            Err(e) => {
                warn!(error = %e, "query embedding failed; dense search skipped");
                None
            }
        };

        let state = self.state.read().await;
        if state.corpus.is_empty() {
            return Vec::new();
        }
        let dense = match &query_vector {
            Some(q) => self.dense_candidates(&state.corpus, q, top_k, filter).await.unwrap_or_else(|e| {
                warn!(error = %e, "dense search failed");
                Vec::new()
            }),
            None => Vec::new(),
        };
        let sparse = sparse_candidates(&state, query, top_k, filter).unwrap_or_else(|e| {
            warn!(error = %e, "sparse search failed");
            Vec::new()
        });
        debug!(
            dense = dense.len(),
            sparse = sparse.len(),
            best_distance = dense.first().map(|h| h.score),
            best_bm25 = sparse.first().map(|h| h.score),
            "hybrid candidates"
        );
        fuse(&state.corpus, dense, sparse)
    }

    async fn dense_candidates(&self, corpus: &Corpus, query: &[f32], top_k: usize, filter: &Filter) -> Result<Vec<SearchHit>> {
        let fetch = if filter.is_empty() { top_k } else { top_k.saturating_mul(self.over_fetch_factor) };
        let hits = corpus.dense().search(query, fetch).await?;
        Ok(hits
            .into_iter()
            .filter(|(id, _)| passes(corpus, *id, filter))
            .take(top_k)
            .map(|(id, distance)| SearchHit { id, score: distance, source: SourceKind::Dense })
            .collect())
    }
}

fn passes(corpus: &Corpus, id: PassageId, filter: &Filter) -> bool {
    filter.is_empty() || corpus.metadata(id).is_some_and(|m| filter.matches(m))
}

fn sparse_candidates(state: &IndexState, query: &str, top_k: usize, filter: &Filter) -> Result<Vec<SearchHit>> {
    let mut scores = state.sparse.score(query)?;
    if !filter.is_empty() {
        for (id, score) in scores.iter_mut().enumerate() {
            if *score > 0.0 && !passes(&state.corpus, id as PassageId, filter) {
                *score = 0.0;
            }
        }
    }
    Ok(SparseIndex::top_k(&scores, top_k)
        .into_iter()
        .map(|(id, score)| SearchHit { id, score, source: SourceKind::Sparse })
        .collect())
}

/// A fused candidate with the hit that first contributed its text.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub text: String,
    pub hit: SearchHit,
}

/// Dense hits in similarity order, then sparse hits, deduplicated by exact text.
fn fuse(corpus: &Corpus, dense: Vec<SearchHit>, sparse: Vec<SearchHit>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(dense.len() + sparse.len());
    for hit in dense.into_iter().chain(sparse) {
        if let Some(text) = corpus.text(hit.id) {
            if seen.insert(text) {
                out.push(Candidate { text: text.to_string(), hit });
            }
        }
    }
    out
}

/// Stable descending sort by reranker score; equal scores keep fused order.
/// `None` when the reranker fails on any candidate.
fn rerank(reranker: &dyn Reranker, query: &str, candidates: &[String]) -> Option<Vec<String>> {
    let mut scored = Vec::with_capacity(candidates.len());
    for text in candidates {
        match reranker.score(query, text) {
            Ok(score) => scored.push((score, text.clone())),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "{}", Error::RerankUnavailable);
                return None;
            }
        }
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    Some(scored.into_iter().map(|(_, text)| text).collect())
}
