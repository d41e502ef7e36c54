use anyhow::Result;
use std::collections::BTreeSet;

use riskrag_core::traits::Reranker;

use crate::tokens;

/// Fraction of distinct query terms that occur in the passage.
#[derive(Debug, Default, Clone, Copy)]
pub struct TermOverlapReranker;

impl Reranker for TermOverlapReranker {
    fn score(&self, query: &str, passage: &str) -> Result<f32> {
        let query_terms: BTreeSet<String> = tokens(query).collect();
        if query_terms.is_empty() { return Ok(0.0); }
        let passage_terms: BTreeSet<String> = tokens(passage).collect();
        let hits = query_terms.iter().filter(|t| passage_terms.contains(*t)).count();
        Ok(hits as f32 / query_terms.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_fraction_of_query_terms() {
        let r = TermOverlapReranker;
        assert_eq!(r.score("default risk", "Default risk is elevated").unwrap(), 1.0);
        assert_eq!(r.score("default risk", "risk of fire").unwrap(), 0.5);
        assert_eq!(r.score("default risk", "nothing relevant").unwrap(), 0.0);
        assert_eq!(r.score("", "anything").unwrap(), 0.0);
    }
}
