use serde::Deserialize;
use std::collections::HashMap;

use riskrag_core::error::{Error, Result};

pub const TICKERS_URL: &str = "https://www.sec.gov/files/company_tickers.json";
const SUBMISSIONS_BASE: &str = "https://data.sec.gov/submissions";
const ARCHIVES_BASE: &str = "https://www.sec.gov/Archives/edgar/data";

#[derive(Deserialize)]
struct TickerEntry {
    cik_str: u64,
    ticker: String,
}

#[derive(Deserialize)]
struct Submissions {
    filings: Filings,
}

#[derive(Deserialize)]
struct Filings {
    recent: Recent,
}

/// Parallel arrays, one entry per filing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Recent {
    accession_number: Vec<String>,
    filing_date: Vec<String>,
    form: Vec<String>,
    primary_document: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingRef {
    pub accession_number: String,
    pub filing_date: String,
    pub form: String,
    pub primary_document: String,
}

/// Zero-padded 10-digit CIK for `ticker` from `company_tickers.json`.
pub fn find_cik(tickers_json: &str, ticker: &str) -> Result<Option<String>> {
    let entries: HashMap<String, TickerEntry> =
        serde_json::from_str(tickers_json).map_err(|e| Error::FetchFailure(format!("company tickers: {e}")))?;
    Ok(entries
        .values()
        .find(|e| e.ticker.eq_ignore_ascii_case(ticker))
        .map(|e| format!("{:010}", e.cik_str)))
}

/// Up to `limit` most recent filings of `form_type`, newest first as listed.
pub fn recent_filings(submissions_json: &str, form_type: &str, limit: usize) -> Result<Vec<FilingRef>> {
    let submissions: Submissions =
        serde_json::from_str(submissions_json).map_err(|e| Error::FetchFailure(format!("submissions: {e}")))?;
    let r = submissions.filings.recent;
    let n = r.accession_number.len().min(r.filing_date.len()).min(r.form.len()).min(r.primary_document.len());
    Ok((0..n)
        .filter(|&i| r.form[i] == form_type)
        .take(limit)
        .map(|i| FilingRef {
            accession_number: r.accession_number[i].clone(),
            filing_date: r.filing_date[i].clone(),
            form: r.form[i].clone(),
            primary_document: r.primary_document[i].clone(),
        })
        .collect())
}

pub fn submissions_url(cik: &str) -> String {
    format!("{SUBMISSIONS_BASE}/CIK{cik}.json")
}

/// Archive paths use the CIK without padding and the accession number without hyphens.
pub fn archive_url(cik: &str, accession_number: &str, primary_document: &str) -> Result<String> {
    let cik: u64 = cik.parse().map_err(|_| Error::FetchFailure(format!("malformed CIK '{cik}'")))?;
    let folder = accession_number.replace('-', "");
    Ok(format!("{ARCHIVES_BASE}/{cik}/{folder}/{primary_document}"))
}

pub fn save_name(ticker: &str, form: &str, filing_date: &str) -> String {
    format!("{}_{form}_{filing_date}.htm", ticker.to_uppercase())
}
