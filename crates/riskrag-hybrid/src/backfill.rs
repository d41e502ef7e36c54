//! Live backfill for tickers the corpus knows nothing about.
//!
//! A ticker-scoped retrieve that comes back empty moves the controller to
//! [`BackfillState::NeedsBackfill`]: filings are fetched, exactly those files are
//! ingested, and the identical retrieve is issued once more. Recoverable failures
//! end in a single placeholder passage; fatal ones ([`Error::is_fatal`]) propagate.
//!
//! Backfills of one ticker are serialized, and files whose name is already a
//! stored `source` are not ingested again.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use riskrag_core::config::BackfillSettings;
use riskrag_core::error::{Error, Result};
use riskrag_core::traits::FilingFetcher;
use riskrag_core::types::Filter;

use crate::ingest::Ingestor;
use crate::retriever::HybridRetriever;

/// Leading phrase of every placeholder passage.
pub const PLACEHOLDER_SENTINEL: &str = "No specific documents found for";

pub fn placeholder(ticker: &str) -> String {
    format!("{PLACEHOLDER_SENTINEL} {ticker}. Using general market risk assessment.")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillState {
    HasEvidence,
    NeedsBackfill,
}

/// Why the placeholder was returned.
#[derive(Debug)]
pub enum PlaceholderCause {
    LiveFetchDisabled,
    NoFetcher,
    NothingFetched,
    EmptyAfterBackfill,
    Failed(Error),
}

impl fmt::Display for PlaceholderCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LiveFetchDisabled => f.write_str("live fetching disabled"),
            Self::NoFetcher => f.write_str("no filing fetcher configured"),
            Self::NothingFetched => f.write_str("fetcher returned no filings"),
            Self::EmptyAfterBackfill => f.write_str("no passages matched after backfill"),
            Self::Failed(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug)]
pub enum Evidence {
    /// Passages already in the corpus.
    Found(Vec<String>),
    /// Passages that only matched after fetching and ingesting new filings.
    Backfilled { passages: Vec<String>, ingested: usize },
    Placeholder { text: String, cause: PlaceholderCause },
}

impl Evidence {
    pub fn passages(&self) -> Vec<String> {
        match self {
            Self::Found(p) | Self::Backfilled { passages: p, .. } => p.clone(),
            Self::Placeholder { text, .. } => vec![text.clone()],
        }
    }

    pub fn into_passages(self) -> Vec<String> {
        match self {
            Self::Found(p) | Self::Backfilled { passages: p, .. } => p,
            Self::Placeholder { text, .. } => vec![text],
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder { .. })
    }
}

pub struct BackfillController {
    retriever: Arc<HybridRetriever>,
    ingestor: Arc<Ingestor>,
    fetcher: Option<Arc<dyn FilingFetcher>>,
    settings: BackfillSettings,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl BackfillController {
    pub fn new(
        retriever: Arc<HybridRetriever>,
        ingestor: Arc<Ingestor>,
        fetcher: Option<Arc<dyn FilingFetcher>>,
        settings: BackfillSettings,
    ) -> Self {
        Self { retriever, ingestor, fetcher, settings, in_flight: Mutex::new(HashMap::new()) }
    }

    pub fn state_for(results: &[String], live_fetch: bool) -> BackfillState {
        if results.is_empty() && live_fetch { BackfillState::NeedsBackfill } else { BackfillState::HasEvidence }
    }

    /// Retrieve `query` scoped to `ticker`, backfilling at most once when nothing matches.
    ///
    /// Only [`Error::ShapeMismatch`] and [`Error::CorpusCorruption`] come back as
    /// errors; everything else ends in placeholder evidence.
    pub async fn retrieve(&self, ticker: &str, query: &str, top_k: usize, live_fetch: bool) -> Result<Evidence> {
        let filter = Filter::ticker(ticker);
        let first = self.retriever.retrieve(query, top_k, &filter).await;
        if !first.is_empty() {
            return Ok(Evidence::Found(first));
        }
        let live = live_fetch && self.settings.enabled;
        if Self::state_for(&first, live) == BackfillState::HasEvidence {
            return Ok(give_up(ticker, PlaceholderCause::LiveFetchDisabled));
        }
        let Some(fetcher) = self.fetcher.clone() else {
            return Ok(give_up(ticker, PlaceholderCause::NoFetcher));
        };

        info!(ticker, "no passages for ticker; backfilling");
        let ingested = match self.fetch_and_ingest(fetcher, ticker).await {
            Ok(Some(n)) => n,
            Ok(None) => return Ok(give_up(ticker, PlaceholderCause::NothingFetched)),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(give_up(ticker, PlaceholderCause::Failed(e))),
        };

        let retry = self.retriever.retrieve(query, top_k, &filter).await;
        if retry.is_empty() {
            return Ok(give_up(ticker, PlaceholderCause::EmptyAfterBackfill));
        }
        Ok(Evidence::Backfilled { passages: retry, ingested })
    }

    fn ticker_lock(&self, ticker: &str) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(ticker.to_string()).or_default())
    }

    /// Fetch and ingest as one spawned task bounded by the configured timeout.
    /// `Ok(None)` when the fetcher found nothing.
    async fn fetch_and_ingest(&self, fetcher: Arc<dyn FilingFetcher>, ticker: &str) -> Result<Option<usize>> {
        let task = tokio::spawn(fetch_then_ingest(
            self.ticker_lock(ticker),
            fetcher,
            Arc::clone(&self.ingestor),
            ticker.to_string(),
            self.settings.fetch_count,
        ));
        let timeout = self.settings.timeout();
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(Error::fetch(join)),
            Err(_) => Err(Error::BackfillTimeout(timeout)),
        }
    }
}

/// Holds the ticker's lock for the whole fetch and ingest, so a backfill that
/// outlived its caller's timeout finishes before the next one for that ticker starts.
async fn fetch_then_ingest(
    lock: Arc<AsyncMutex<()>>,
    fetcher: Arc<dyn FilingFetcher>,
    ingestor: Arc<Ingestor>,
    ticker: String,
    count: usize,
) -> Result<Option<usize>> {
    let _guard = lock.lock_owned().await;
    let files = fetcher.fetch(&ticker, count).await?;
    if files.is_empty() {
        return Ok(None);
    }
    info!(ticker = %ticker, files = files.len(), "fetched filings");
    ingestor.ingest_new_files(&files).await.map(Some)
}

fn give_up(ticker: &str, cause: PlaceholderCause) -> Evidence {
    warn!(ticker, cause = %cause, "returning placeholder evidence");
    Evidence::Placeholder { text: placeholder(ticker), cause }
}
