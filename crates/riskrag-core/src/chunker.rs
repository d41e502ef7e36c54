//! Markup cleaning and word-window chunking of filings.
//!
//! A document goes through [`clean_markup`], then [`chunk_words`], and every
//! surviving window is prefixed with `Source: <file name> | ` and tagged with the
//! metadata parsed from the `TICKER_FORM_DATE.ext` file name.

use scraper::{node::Node, ElementRef, Html};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ChunkingSettings;
use crate::error::Result;
use crate::types::{LabeledChunk, Meta, RawDocument, DATE_KEY, FORM_KEY, SOURCE_KEY, TICKER_KEY};

/// Subtrees whose text never reaches a passage.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "table", "head", "noscript", "template", "svg"];

const FILING_EXTENSIONS: &[&str] = &["htm", "html", "txt"];

/// Strip tags plus script/style/table subtrees and collapse whitespace runs.
pub fn clean_markup(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let mut parts = Vec::new();
    collect_text(document.root_element(), &mut parts);
    collapse_whitespace(&parts.join(" "))
}

fn collect_text(element: ElementRef<'_>, parts: &mut Vec<String>) {
    if SKIPPED_ELEMENTS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    collect_text(child_element, parts);
                }
            }
            _ => {}
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sliding word window: `chunk_size` words per chunk, starts `chunk_size - overlap`
/// words apart. The window stops once it has covered the last word, and chunks of
/// `min_chars` characters or fewer are dropped.
///
/// No trailing window lying entirely inside the previous chunk is emitted: 950
/// words at size 500, overlap 50 give words 0..500 and 450..950, and no third
/// chunk 900..950.
pub fn chunk_words(text: &str, settings: &ChunkingSettings) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = settings.step();
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + settings.chunk_size).min(words.len());
        let chunk = words[start..end].join(" ");
        if chunk.chars().count() > settings.min_chars {
            chunks.push(chunk);
        }
        if end >= words.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Parsed `TICKER_FORM_DATE.ext` file name.
///
/// `ticker` is the first `_` segment of the file name exactly as written; `form`
/// and `date` are only present when the name has those segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingName {
    pub file_name: String,
    pub ticker: String,
    pub form: Option<String>,
    pub date: Option<String>,
}

impl FilingName {
    pub fn parse(label: &str) -> Self {
        let file_name = Path::new(label)
            .file_name()
            .map_or_else(|| label.to_string(), |n| n.to_string_lossy().to_string());
        let mut segments = file_name.split('_');
        let ticker = segments.next().unwrap_or_default().to_string();
        let form = segments.next().map(str::to_string);
        let date = segments.next().map(|s| {
            Path::new(s).file_stem().map_or_else(|| s.to_string(), |st| st.to_string_lossy().to_string())
        });
        Self { file_name, ticker, form, date }
    }

    pub fn metadata(&self) -> Meta {
        let mut meta = Meta::new();
        meta.insert(TICKER_KEY.to_string(), self.ticker.clone());
        meta.insert(SOURCE_KEY.to_string(), self.file_name.clone());
        if let Some(form) = &self.form { meta.insert(FORM_KEY.to_string(), form.clone()); }
        if let Some(date) = &self.date { meta.insert(DATE_KEY.to_string(), date.clone()); }
        meta
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    settings: ChunkingSettings,
}

impl Chunker {
    pub fn new(settings: ChunkingSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &ChunkingSettings { &self.settings }

    pub fn chunk_document(&self, doc: &RawDocument) -> Vec<LabeledChunk> {
        let name = FilingName::parse(&doc.source_label);
        let metadata = name.metadata();
        let cleaned = clean_markup(&doc.content);
        let chunks: Vec<LabeledChunk> = chunk_words(&cleaned, &self.settings)
            .into_iter()
            .map(|chunk| LabeledChunk {
                text: format!("Source: {} | {}", name.file_name, chunk),
                metadata: metadata.clone(),
            })
            .collect();
        debug!(source = %name.file_name, ticker = %name.ticker, chunks = chunks.len(), "chunked document");
        chunks
    }

    pub fn chunk_documents(&self, docs: &[RawDocument]) -> Vec<LabeledChunk> {
        docs.iter().flat_map(|d| self.chunk_document(d)).collect()
    }
}

/// Read a filing from disk, decoding lossily when it is not valid UTF-8.
pub fn read_document(path: &Path) -> Result<RawDocument> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => String::from_utf8_lossy(&fs::read(path)?).to_string(),
    };
    let label = path
        .file_name()
        .map_or_else(|| path.to_string_lossy().to_string(), |n| n.to_string_lossy().to_string());
    Ok(RawDocument { content, source_label: label })
}

/// Every `.htm`, `.html` and `.txt` file under `root`, sorted.
pub fn list_filings(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| FILING_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    info!(dir = %root.display(), files = files.len(), "listed filings");
    files
}
