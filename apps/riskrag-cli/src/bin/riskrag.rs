use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use riskrag_core::chunker::{list_filings, read_document};
use riskrag_core::config::{Config, Settings};
use riskrag_core::traits::{FilingFetcher, Reranker};
use riskrag_core::types::{Filter, SourceKind};
use riskrag_edgar::EdgarFetcher;
use riskrag_embed::{default_embedder, TermOverlapReranker};
use riskrag_hybrid::{Evidence, RiskContext};

const USAGE: &str = "Usage: riskrag <command> [args...]

Commands:
  ingest [DIR]                       chunk, embed and index every filing under DIR
  search <QUERY> [--ticker T] [-k N] [--explain]
                                     hybrid search over the corpus; --explain lists
                                     fused candidates with strategy and score
  evidence <TICKER> [--offline]      risk evidence for a ticker, backfilling from EDGAR
  fetch <TICKER> [COUNT]             download filings from EDGAR without ingesting";

fn usage_exit() -> ! {
    eprintln!("{USAGE}");
    std::process::exit(1)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lance=warn,lancedb=warn,tantivy=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn edgar_fetcher(settings: &Settings) -> anyhow::Result<Arc<dyn FilingFetcher>> {
    let fetcher = EdgarFetcher::new(&settings.edgar, settings.data.filings_dir(), settings.backfill.form_type.clone())?;
    Ok(Arc::new(fetcher))
}

async fn context(settings: Settings, live: bool) -> anyhow::Result<Arc<RiskContext>> {
    let embedder = default_embedder(settings.embedding.dim);
    let reranker: Arc<dyn Reranker> = Arc::new(TermOverlapReranker);
    let fetcher = if live { Some(edgar_fetcher(&settings)?) } else { None };
    Ok(RiskContext::initialize(settings, embedder, Some(reranker), fetcher).await?)
}

async fn ingest(settings: Settings, args: &[String]) -> anyhow::Result<()> {
    let dir = args.first().map_or_else(|| settings.data.filings_dir(), PathBuf::from);
    let files = list_filings(&dir);
    if files.is_empty() {
        println!("No filings under {}", dir.display());
        return Ok(());
    }
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let mut docs = Vec::with_capacity(files.len());
    for path in &files {
        pb.set_message(path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
        match read_document(path) {
            Ok(doc) => docs.push(doc),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable filing"),
        }
        pb.inc(1);
    }
    pb.finish_with_message("read");

    let ctx = context(settings, false).await?;
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("embedding and indexing passages");
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));
    let appended = ctx.ingestor().ingest_documents(&docs).await?;
    spinner.finish_and_clear();
    println!("Ingested {} files into {} passages ({} total)", docs.len(), appended, ctx.len().await);
    ctx.shutdown().await?;
    Ok(())
}

async fn search(settings: Settings, args: &[String]) -> anyhow::Result<()> {
    let mut query = None;
    let mut filter = Filter::new();
    let mut top_k = settings.retrieval.top_k;
    let mut explain = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--ticker" | "-t" => {
                let Some(t) = args.get(i + 1) else { usage_exit() };
                filter = filter.with(riskrag_core::types::TICKER_KEY, t.to_uppercase());
                i += 1;
            }
            "-k" | "--top-k" => {
                let Some(k) = args.get(i + 1).and_then(|k| k.parse().ok()) else { usage_exit() };
                top_k = k;
                i += 1;
            }
            "--explain" => explain = true,
            other if !other.starts_with('-') => query = Some(other.to_string()),
            _ => usage_exit(),
        }
        i += 1;
    }
    let Some(query) = query else { usage_exit() };
    let ctx = context(settings, false).await?;
    if explain {
        let candidates = ctx.candidates(&query, top_k, &filter).await;
        if candidates.is_empty() {
            println!("No passages matched.");
        }
        for c in &candidates {
            let (kind, label) = match c.hit.source {
                SourceKind::Dense => ("dense", "distance"),
                SourceKind::Sparse => ("sparse", "bm25"),
            };
            println!("[{kind} #{} {label}={:.4}] {}\n", c.hit.id, c.hit.score, c.text);
        }
        return Ok(());
    }
    let results = ctx.retrieve(&query, top_k, &filter).await;
    if results.is_empty() {
        println!("No passages matched.");
    }
    for (rank, text) in results.iter().enumerate() {
        println!("{}. {}\n", rank + 1, text);
    }
    Ok(())
}

async fn evidence(settings: Settings, args: &[String]) -> anyhow::Result<()> {
    let Some(ticker) = args.iter().find(|a| !a.starts_with('-')) else { usage_exit() };
    let live = !args.iter().any(|a| a == "--offline");
    let ctx = context(settings, live).await?;
    let evidence = ctx.evidence(ticker, live).await?;
    match &evidence {
        Evidence::Found(p) => println!("{} passage(s) from the local corpus", p.len()),
        Evidence::Backfilled { passages, ingested } => {
            println!("{} passage(s) after backfilling {} new passage(s) from EDGAR", passages.len(), ingested);
        }
        Evidence::Placeholder { cause, .. } => println!("No evidence ({cause})"),
    }
    for text in evidence.passages() {
        println!("- {text}\n");
    }
    ctx.shutdown().await?;
    Ok(())
}

async fn fetch(settings: Settings, args: &[String]) -> anyhow::Result<()> {
    let Some(ticker) = args.first() else { usage_exit() };
    let count = match args.get(1) {
        Some(c) => c.parse().unwrap_or_else(|_| usage_exit()),
        None => settings.backfill.fetch_count,
    };
    let files = edgar_fetcher(&settings)?.fetch(ticker, count).await?;
    for f in &files {
        println!("{}", f.display());
    }
    println!("Downloaded {} filing(s)", files.len());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {}", e);
        e
    })?;
    let settings = config.settings()?;
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        usage_exit();
    }
    let cmd = args.remove(0);
    match cmd.as_str() {
        "ingest" => ingest(settings, &args).await,
        "search" => search(settings, &args).await,
        "evidence" => evidence(settings, &args).await,
        "fetch" => fetch(settings, &args).await,
        "-h" | "--help" | "help" => {
            println!("{USAGE}");
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", cmd);
            usage_exit()
        }
    }
}
