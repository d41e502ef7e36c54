//! Domain types shared by the chunker, the corpus store and both indexes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type PassageId = u64;
pub type Meta = BTreeMap<String, String>;

pub const TICKER_KEY: &str = "ticker";
pub const SOURCE_KEY: &str = "source";
pub const FORM_KEY: &str = "form";
pub const DATE_KEY: &str = "date";

/// One retrievable unit of the corpus.
///
/// - `id`: 0-based append position, never reused
/// - `text`: source-labelled, markup-free passage text
/// - `metadata`: equality-filter fields (`ticker`, `source`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub id: PassageId,
    pub text: String,
    pub metadata: Meta,
}

/// A raw document handed to ingestion: its content and the label it came from
/// (normally a file name following `TICKER_FORM_DATE.ext`).
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub content: String,
    pub source_label: String,
}

impl RawDocument {
    pub fn new(content: impl Into<String>, source_label: impl Into<String>) -> Self {
        Self { content: content.into(), source_label: source_label.into() }
    }
}

/// Chunker output, ready to be embedded and appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledChunk {
    pub text: String,
    pub metadata: Meta,
}

/// Exact-match metadata predicate. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter(Meta);

impl Filter {
    pub fn new() -> Self { Self::default() }

    pub fn ticker(ticker: impl Into<String>) -> Self {
        Self::new().with(TICKER_KEY, ticker)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn get(&self, key: &str) -> Option<&str> { self.0.get(key).map(String::as_str) }

    pub fn matches(&self, metadata: &Meta) -> bool {
        self.0.iter().all(|(k, v)| metadata.get(k) == Some(v))
    }
}

impl From<Meta> for Filter {
    fn from(m: Meta) -> Self { Self(m) }
}

/// Indicates which retrieval strategy produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Dense,
    Sparse,
}

/// A scored candidate from one strategy.
///
/// For `Dense` the score is an L2 distance (lower is closer); for `Sparse` it is a
/// BM25 score (higher is better).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: PassageId,
    pub score: f32,
    pub source: SourceKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> Meta {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&Meta::new()));
        assert!(Filter::new().matches(&meta(&[("ticker", "AAPL")])));
    }

    #[test]
    fn filter_requires_every_key_with_equal_value() {
        let f = Filter::ticker("AAPL").with("form", "10-K");
        assert!(f.matches(&meta(&[("ticker", "AAPL"), ("form", "10-K"), ("source", "x")])));
        assert!(!f.matches(&meta(&[("ticker", "AAPL")])));
        assert!(!f.matches(&meta(&[("ticker", "MSFT"), ("form", "10-K")])));
        assert!(!Filter::ticker("aapl").matches(&meta(&[("ticker", "AAPL")])));
    }
}
