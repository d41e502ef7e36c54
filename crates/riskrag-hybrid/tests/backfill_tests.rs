use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use riskrag_core::config::{ChunkingSettings, Settings};
use riskrag_core::traits::{Embedder, FilingFetcher};
use riskrag_core::types::Filter;
use riskrag_core::{Error, Result};
use riskrag_embed::HashingEmbedder;
use riskrag_hybrid::{BackfillController, BackfillState, Evidence, PlaceholderCause, RiskContext, PLACEHOLDER_SENTINEL};
use tempfile::TempDir;

const DIM: usize = 128;

fn settings(index_dir: &Path) -> Settings {
    let mut s = Settings::default();
    s.data.index_dir = index_dir.to_string_lossy().to_string();
    s.embedding.dim = DIM;
    s.chunking = ChunkingSettings { chunk_size: 40, overlap: 5, min_chars: 10 };
    s.backfill.timeout_secs = 1;
    s
}

async fn context(index_dir: &Path, fetcher: Option<Arc<dyn FilingFetcher>>) -> Arc<RiskContext> {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
    RiskContext::initialize(settings(index_dir), embedder, None, fetcher).await.expect("initialize")
}

/// Hands out files already sitting in a download directory.
struct DirFetcher {
    files: Vec<PathBuf>,
}

#[async_trait]
impl FilingFetcher for DirFetcher {
    async fn fetch(&self, ticker: &str, count: usize) -> Result<Vec<PathBuf>> {
        let prefix = format!("{ticker}_");
        Ok(self
            .files
            .iter()
            .filter(|p| p.file_name().is_some_and(|n| n.to_string_lossy().starts_with(&prefix)))
            .take(count)
            .cloned()
            .collect())
    }
}

struct FailingFetcher;

#[async_trait]
impl FilingFetcher for FailingFetcher {
    async fn fetch(&self, _ticker: &str, _count: usize) -> Result<Vec<PathBuf>> {
        Err(Error::FetchFailure("connection refused".into()))
    }
}

struct StalledFetcher;

#[async_trait]
impl FilingFetcher for StalledFetcher {
    async fn fetch(&self, _ticker: &str, _count: usize) -> Result<Vec<PathBuf>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// Slow enough that two concurrent backfills overlap.
struct SlowDirFetcher {
    files: Vec<PathBuf>,
}

#[async_trait]
impl FilingFetcher for SlowDirFetcher {
    async fn fetch(&self, _ticker: &str, _count: usize) -> Result<Vec<PathBuf>> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(self.files.clone())
    }
}

/// Returns no vectors at all, whatever it is asked to embed.
struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn dim(&self) -> usize { DIM }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(Vec::new())
    }
}

fn write_filing(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("<html><body><p>{body}</p></body></html>")).expect("write filing");
    path
}

fn assert_placeholder(evidence: &Evidence, ticker: &str) {
    let passages = evidence.passages();
    assert_eq!(passages.len(), 1);
    assert!(passages[0].starts_with(PLACEHOLDER_SENTINEL), "{passages:?}");
    assert_eq!(
        passages[0],
        format!("No specific documents found for {ticker}. Using general market risk assessment.")
    );
}

#[test]
fn state_transitions() {
    assert_eq!(BackfillController::state_for(&[], true), BackfillState::NeedsBackfill);
    assert_eq!(BackfillController::state_for(&[], false), BackfillState::HasEvidence);
    assert_eq!(BackfillController::state_for(&["x".to_string()], true), BackfillState::HasEvidence);
}

#[tokio::test]
async fn empty_corpus_without_fetcher_gives_placeholder() {
    let tmp = TempDir::new().expect("tmp");
    let ctx = context(tmp.path(), None).await;
    let evidence = ctx.evidence("xyz", true).await.expect("evidence");
    assert_placeholder(&evidence, "XYZ");
    assert!(matches!(evidence, Evidence::Placeholder { cause: PlaceholderCause::NoFetcher, .. }));

    let offline = ctx.evidence("XYZ", false).await.expect("evidence");
    assert!(matches!(offline, Evidence::Placeholder { cause: PlaceholderCause::LiveFetchDisabled, .. }));
}

#[tokio::test]
async fn fetcher_with_nothing_gives_placeholder() {
    let tmp = TempDir::new().expect("tmp");
    let ctx = context(tmp.path(), Some(Arc::new(DirFetcher { files: Vec::new() }))).await;
    let evidence = ctx.evidence("QQQ", true).await.expect("evidence");
    assert_placeholder(&evidence, "QQQ");
    assert!(matches!(evidence, Evidence::Placeholder { cause: PlaceholderCause::NothingFetched, .. }));
}

#[tokio::test]
async fn fetch_failure_is_recovered() {
    let tmp = TempDir::new().expect("tmp");
    let ctx = context(tmp.path(), Some(Arc::new(FailingFetcher))).await;
    let evidence = ctx.evidence("QQQ", true).await.expect("evidence");
    assert_placeholder(&evidence, "QQQ");
    assert!(matches!(evidence, Evidence::Placeholder { cause: PlaceholderCause::Failed(Error::FetchFailure(_)), .. }));
}

#[tokio::test]
async fn stalled_fetch_times_out() {
    let tmp = TempDir::new().expect("tmp");
    let ctx = context(tmp.path(), Some(Arc::new(StalledFetcher))).await;
    let evidence = ctx.evidence("SLOW", true).await.expect("evidence");
    assert_placeholder(&evidence, "SLOW");
    assert!(matches!(evidence, Evidence::Placeholder { cause: PlaceholderCause::Failed(Error::BackfillTimeout(_)), .. }));
}

#[tokio::test]
async fn backfill_ingests_only_fetched_files() {
    let tmp = TempDir::new().expect("tmp");
    let downloads = tmp.path().join("downloads");
    fs::create_dir_all(&downloads).expect("mkdir");
    let ccc = write_filing(&downloads, "CCC_10-K_2025-03-31.htm", "Risk factors include default on revolving credit facility");
    write_filing(&downloads, "DDD_10-K_2025-03-31.htm", "Default warnings for a company nobody asked about");

    let fetcher = DirFetcher { files: vec![ccc] };
    let ctx = context(&tmp.path().join("index"), Some(Arc::new(fetcher))).await;

    let evidence = ctx.evidence("ccc", true).await.expect("evidence");
    match &evidence {
        Evidence::Backfilled { passages, ingested } => {
            assert_eq!(*ingested, 1);
            assert_eq!(passages.len(), 1);
            assert!(passages[0].starts_with("Source: CCC_10-K_2025-03-31.htm | Risk factors"));
        }
        other => panic!("expected backfilled evidence, got {other:?}"),
    }
    assert_eq!(ctx.len().await, 1);
    assert!(ctx.retrieve("default", 3, &Filter::ticker("DDD")).await.is_empty());

    let again = ctx.evidence("CCC", true).await.expect("evidence");
    assert!(matches!(again, Evidence::Found(ref p) if p.len() == 1));
}

#[tokio::test]
async fn shape_mismatch_during_backfill_is_an_error() {
    let tmp = TempDir::new().expect("tmp");
    let downloads = tmp.path().join("downloads");
    fs::create_dir_all(&downloads).expect("mkdir");
    let eee = write_filing(&downloads, "EEE_10-K_2025-03-31.htm", "Going concern doubts and covenant breaches");
    let fetcher: Arc<dyn FilingFetcher> = Arc::new(DirFetcher { files: vec![eee] });
    let embedder: Arc<dyn Embedder> = Arc::new(ShortEmbedder);
    let ctx = RiskContext::initialize(settings(&tmp.path().join("index")), embedder, None, Some(fetcher))
        .await
        .expect("initialize");

    let err = ctx.evidence("EEE", true).await.expect_err("shape mismatch");
    assert!(matches!(err, Error::ShapeMismatch { vectors: 0, .. }), "{err:?}");
    assert!(ctx.is_empty().await);
}

#[tokio::test]
async fn concurrent_backfills_ingest_once() {
    let tmp = TempDir::new().expect("tmp");
    let downloads = tmp.path().join("downloads");
    fs::create_dir_all(&downloads).expect("mkdir");
    let ccc = write_filing(&downloads, "CCC_10-K_2025-03-31.htm", "Risk factors include default on revolving credit facility");
    let fetcher: Arc<dyn FilingFetcher> = Arc::new(SlowDirFetcher { files: vec![ccc] });
    let mut settings = settings(&tmp.path().join("index"));
    settings.backfill.timeout_secs = 10;
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(DIM));
    let ctx = RiskContext::initialize(settings, embedder, None, Some(fetcher)).await.expect("initialize");

    let (a, b) = tokio::join!(ctx.evidence("CCC", true), ctx.evidence("CCC", true));
    let (a, b) = (a.expect("first"), b.expect("second"));
    assert!(!a.is_placeholder(), "{a:?}");
    assert!(!b.is_placeholder(), "{b:?}");
    assert_eq!(ctx.len().await, 1);

    let ingested: Vec<usize> = [&a, &b]
        .iter()
        .filter_map(|e| match e {
            Evidence::Backfilled { ingested, .. } => Some(*ingested),
            _ => None,
        })
        .collect();
    assert_eq!(ingested.iter().sum::<usize>(), 1, "{ingested:?}");
}
