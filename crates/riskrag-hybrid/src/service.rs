use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use riskrag_core::chunker::Chunker;
use riskrag_core::config::Settings;
use riskrag_core::error::{Error, Result};
use riskrag_core::traits::{Embedder, FilingFetcher, Reranker};
use riskrag_core::types::Filter;
use riskrag_vector::Corpus;

use crate::backfill::{BackfillController, Evidence};
use crate::ingest::Ingestor;
use crate::retriever::{Candidate, HybridRetriever, IndexState, SharedState};

/// Process-wide retrieval context, built once and shared as `Arc<RiskContext>`.
pub struct RiskContext {
    settings: Settings,
    state: SharedState,
    retriever: Arc<HybridRetriever>,
    ingestor: Arc<Ingestor>,
    backfill: BackfillController,
}

impl RiskContext {
    /// Restore the corpus from `settings.data.index_dir` and wire every component.
    pub async fn initialize(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        reranker: Option<Arc<dyn Reranker>>,
        fetcher: Option<Arc<dyn FilingFetcher>>,
    ) -> Result<Arc<Self>> {
        settings.validate()?;
        if embedder.dim() != settings.embedding.dim {
            return Err(Error::DimensionMismatch { expected: settings.embedding.dim, got: embedder.dim() });
        }
        let index_dir = settings.data.index_dir();
        let corpus = Corpus::restore(&index_dir, &settings.data.table, settings.embedding.dim).await?;
        let state: SharedState = Arc::new(RwLock::new(IndexState::new(corpus)));

        let retriever = Arc::new(HybridRetriever::new(
            Arc::clone(&state),
            Arc::clone(&embedder),
            reranker,
            settings.retrieval.over_fetch_factor,
        ));
        let chunker = Chunker::new(settings.chunking)?;
        let ingestor = Arc::new(Ingestor::new(Arc::clone(&state), embedder, chunker));
        let backfill = BackfillController::new(
            Arc::clone(&retriever),
            Arc::clone(&ingestor),
            fetcher,
            settings.backfill.clone(),
        );
        info!(index_dir = %index_dir.display(), "risk context ready");
        Ok(Arc::new(Self { settings, state, retriever, ingestor, backfill }))
    }

    pub fn query_for(ticker: &str) -> String {
        format!("Risk factors and default warnings for {ticker}")
    }

    /// Risk evidence for `ticker` (case-insensitive), backfilling when permitted.
    ///
    /// Errors only when a backfill hits a fatal error; see [`BackfillController::retrieve`].
    pub async fn evidence(&self, ticker: &str, live_fetch: bool) -> Result<Evidence> {
        let ticker = ticker.trim().to_uppercase();
        let query = Self::query_for(&ticker);
        self.backfill.retrieve(&ticker, &query, self.settings.retrieval.top_k, live_fetch).await
    }

    pub async fn retrieve(&self, query: &str, top_k: usize, filter: &Filter) -> Vec<String> {
        self.retriever.retrieve(query, top_k, filter).await
    }

    /// Fused candidates with the strategy and score that produced each, before reranking.
    pub async fn candidates(&self, query: &str, top_k: usize, filter: &Filter) -> Vec<Candidate> {
        self.retriever.candidates(query, top_k, filter).await
    }

    pub fn ingestor(&self) -> &Ingestor { &self.ingestor }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub async fn len(&self) -> usize { self.state.read().await.corpus.len() }

    pub async fn is_empty(&self) -> bool { self.len().await == 0 }

    /// Flush the side-record; vectors are already durable.
    pub async fn shutdown(&self) -> Result<()> {
        let state = self.state.read().await;
        state.corpus.persist()?;
        info!(passages = state.corpus.len(), "risk context shut down");
        Ok(())
    }
}
