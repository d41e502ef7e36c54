use std::fs;
use tempfile::TempDir;

use figment::providers::{Format, Toml};
use proptest::prelude::*;
use riskrag_core::chunker::{chunk_words, list_filings, read_document, Chunker};
use riskrag_core::config::{ChunkingSettings, Config};
use riskrag_core::types::RawDocument;

#[test]
fn list_filings_picks_markup_and_text_sorted() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("MSFT_10-K_2024-07-30.htm"), "<p>m</p>").unwrap();
    fs::write(dir.join("AAPL_10-K_2025-10-31.html"), "<p>a</p>").unwrap();
    fs::write(dir.join("notes.txt"), "n").unwrap();
    fs::write(dir.join("image.png"), [0u8, 1, 2]).unwrap();

    let files = list_filings(dir);
    let names: Vec<String> = files.iter().map(|p| p.file_name().unwrap().to_string_lossy().to_string()).collect();
    assert_eq!(names, vec!["AAPL_10-K_2025-10-31.html", "MSFT_10-K_2024-07-30.htm", "notes.txt"]);
}

#[test]
fn read_document_labels_with_file_name_and_tolerates_bad_utf8() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("TSLA_10-K_2025-01-29.htm");
    fs::write(&path, [b'o', b'k', 0xFF, b'!']).unwrap();
    let doc = read_document(&path).expect("read");
    assert_eq!(doc.source_label, "TSLA_10-K_2025-01-29.htm");
    assert!(doc.content.starts_with("ok"));
}

#[test]
fn zero_documents_yield_zero_chunks() {
    let chunker = Chunker::new(ChunkingSettings::default()).unwrap();
    assert!(chunker.chunk_documents(&[]).is_empty());
    assert!(chunker.chunk_documents(&[RawDocument::new("<script>x()</script>", "A_B_C.htm")]).is_empty());
}

#[test]
fn settings_merge_over_defaults() {
    let config = Config::from_figment(
        figment::Figment::from(Toml::string("[retrieval]\ntop_k = 7\n[chunking]\noverlap = 25\n")),
    );
    let settings = config.settings().expect("settings");
    assert_eq!(settings.retrieval.top_k, 7);
    assert_eq!(settings.retrieval.over_fetch_factor, 10);
    assert_eq!(settings.chunking, ChunkingSettings { chunk_size: 500, overlap: 25, min_chars: 50 });
    assert_eq!(config.get::<String>("data.table").unwrap(), "passages");
    settings.validate().expect("valid");
}

#[test]
fn invalid_chunking_is_rejected_by_validation() {
    let config = Config::from_figment(figment::Figment::from(Toml::string("[chunking]\nchunk_size = 10\noverlap = 10\n")));
    assert!(config.settings().unwrap().validate().is_err());
}

proptest! {
    #[test]
    fn windows_step_and_overlap(n in 1usize..400, size in 2usize..60, overlap_frac in 0.0f64..0.9) {
        let overlap = ((size as f64) * overlap_frac) as usize;
        let settings = ChunkingSettings { chunk_size: size, overlap, min_chars: 0 };
        let text = (0..n).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunk_words(&text, &settings);
        prop_assert!(!chunks.is_empty());
        let step = size - overlap;
        for (i, c) in chunks.iter().enumerate() {
            let first = c.split(' ').next().unwrap();
            prop_assert_eq!(first.to_string(), format!("t{}", i * step));
            prop_assert!(c.split(' ').count() <= size);
        }
        for pair in chunks.windows(2) {
            let a: Vec<&str> = pair[0].split(' ').collect();
            let b: Vec<&str> = pair[1].split(' ').collect();
            prop_assert_eq!(&a[a.len() - overlap..], &b[..overlap]);
        }
        let last = chunks.last().unwrap();
        let expected_last = format!("t{}", n - 1);
        prop_assert_eq!(last.split(' ').last().unwrap(), expected_last.as_str());
    }
}
