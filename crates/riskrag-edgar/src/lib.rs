//! SEC EDGAR filing fetcher.
//!
//! Resolves a ticker to its CIK, walks the company's recent submissions for the
//! configured form type and saves each primary document as
//! `TICKER_FORM_DATE.htm` in the download directory.

pub mod submissions;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use riskrag_core::config::EdgarSettings;
use riskrag_core::error::{Error, Result};
use riskrag_core::traits::FilingFetcher;

use crate::submissions::{archive_url, find_cik, recent_filings, save_name, submissions_url, FilingRef, TICKERS_URL};

pub struct EdgarFetcher {
    client: reqwest::Client,
    download_dir: PathBuf,
    form_type: String,
    pause: Duration,
}

impl EdgarFetcher {
    pub fn new(settings: &EdgarSettings, download_dir: PathBuf, form_type: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .gzip(true)
            .build()
            .map_err(Error::fetch)?;
        Ok(Self {
            client,
            download_dir,
            form_type: form_type.into(),
            pause: Duration::from_millis(settings.pause_ms),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        debug!(url, "GET");
        self.client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::FetchFailure(format!("{url}: {e}")))
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        self.get(url).await?.text().await.map_err(|e| Error::FetchFailure(format!("{url}: {e}")))
    }

    async fn download(&self, cik: &str, ticker: &str, filing: &FilingRef) -> Result<PathBuf> {
        let url = archive_url(cik, &filing.accession_number, &filing.primary_document)?;
        let body = self.get(&url).await?.bytes().await.map_err(|e| Error::FetchFailure(format!("{url}: {e}")))?;
        let path = self.download_dir.join(save_name(ticker, &filing.form, &filing.filing_date));
        tokio::fs::write(&path, &body).await?;
        info!(url = %url, path = %path.display(), bytes = body.len(), "saved filing");
        Ok(path)
    }
}

#[async_trait]
impl FilingFetcher for EdgarFetcher {
    /// An unknown ticker or a company without matching filings yields an empty list.
    /// Individual download failures are skipped.
    async fn fetch(&self, ticker: &str, count: usize) -> Result<Vec<PathBuf>> {
        let ticker = ticker.to_uppercase();
        if count == 0 {
            return Ok(Vec::new());
        }
        let tickers = self.get_text(TICKERS_URL).await?;
        let Some(cik) = find_cik(&tickers, &ticker)? else {
            warn!(ticker = %ticker, "no CIK registered for ticker");
            return Ok(Vec::new());
        };
        let submissions = self.get_text(&submissions_url(&cik)).await?;
        let filings = recent_filings(&submissions, &self.form_type, count)?;
        info!(ticker = %ticker, cik = %cik, form = %self.form_type, found = filings.len(), "listed filings");

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let mut saved = Vec::with_capacity(filings.len());
        for filing in &filings {
            match self.download(&cik, &ticker, filing).await {
                Ok(path) => saved.push(path),
                Err(e) => warn!(accession = %filing.accession_number, error = %e, "download failed"),
            }
            tokio::time::sleep(self.pause).await;
        }
        Ok(saved)
    }
}
