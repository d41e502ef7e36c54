use riskrag_core::Error;
use riskrag_text::tantivy_utils::tokenize;
use riskrag_text::SparseIndex;

fn corpus() -> Vec<String> {
    vec![
        "Source: AAA_10-K_2025.htm | Default risk rises with leverage".to_string(),
        "Source: AAA_10-K_2025.htm | Supply chain disruption in Asia".to_string(),
        "Source: BBB_10-K_2025.htm | default DEFAULT default covenant breach risk".to_string(),
    ]
}

#[test]
fn unbuilt_index_is_unavailable() {
    let index = SparseIndex::unbuilt();
    assert!(!index.is_built());
    assert!(matches!(index.score("risk"), Err(Error::IndexUnavailable(_))));
}

#[test]
fn empty_corpus_scores_nothing() {
    let index = SparseIndex::build(&[]).expect("build");
    assert!(index.is_built());
    assert!(index.score("default risk").expect("score").is_empty());
}

#[test]
fn one_score_per_passage_zero_without_overlap() {
    let index = SparseIndex::build(&corpus()).expect("build");
    let scores = index.score("Default").expect("score");
    assert_eq!(scores.len(), 3);
    assert!(scores[0] > 0.0);
    assert_eq!(scores[1], 0.0);
    assert!(scores[2] > scores[0], "higher term frequency ranks first: {scores:?}");
    assert!(scores.iter().all(|s| *s >= 0.0));
}

#[test]
fn query_without_shared_terms_is_all_zero() {
    let index = SparseIndex::build(&corpus()).expect("build");
    assert!(index.score("dividend").unwrap().iter().all(|s| *s == 0.0));
    assert!(index.score("   ").unwrap().iter().all(|s| *s == 0.0));
}

#[test]
fn top_k_keeps_positive_scores_with_stable_ties() {
    let ranked = SparseIndex::top_k(&[0.0, 2.0, 1.0, 2.0, 0.0], 2);
    assert_eq!(ranked, vec![(1, 2.0), (3, 2.0)]);
    assert!(SparseIndex::top_k(&[0.0, 0.0], 5).is_empty());
    assert!(SparseIndex::top_k(&[1.0], 0).is_empty());
}

#[test]
fn rebuild_replaces_previous_contents() {
    let mut index = SparseIndex::build(&corpus()[..1]).expect("build");
    assert_eq!(index.len(), 1);
    index.rebuild(&corpus()).expect("rebuild");
    assert_eq!(index.len(), 3);
    assert!(index.score("supply").unwrap()[1] > 0.0);
}

#[test]
fn tokenizer_lowercases_and_splits_on_whitespace() {
    assert_eq!(tokenize("Default  RISK\tfactors,"), vec!["default", "risk", "factors,"]);
}
