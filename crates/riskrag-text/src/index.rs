use std::time::Instant;

use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{doc, Index, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tracing::debug;

use riskrag_core::error::{Error, Result};
use riskrag_core::types::PassageId;

use crate::tantivy_utils::{build_schema, register_tokenizer, tokenize, ID_FIELD, TEXT_FIELD};

const WRITER_BUDGET: usize = 50_000_000;

/// BM25 over every passage text, rebuilt in full after each ingestion batch.
///
/// A freshly constructed index is *unbuilt* and reports
/// [`Error::IndexUnavailable`]; once built over `n` texts, [`SparseIndex::score`]
/// returns exactly `n` scores with `0.0` meaning no shared term.
#[derive(Default)]
pub struct SparseIndex {
	built: Option<Built>,
}

struct Built {
	searcher: Searcher,
	id_field: Field,
	text_field: Field,
	len: usize,
}

impl SparseIndex {
	pub fn unbuilt() -> Self { Self::default() }

	/// Index `texts[i]` under passage id `i`.
	pub fn build(texts: &[String]) -> Result<Self> {
		let started = Instant::now();
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field(ID_FIELD).map_err(Error::storage)?;
		let text_field = schema.get_field(TEXT_FIELD).map_err(Error::storage)?;
		let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_BUDGET).map_err(Error::storage)?;
		for (id, text) in texts.iter().enumerate() {
			writer.add_document(doc!(id_field => id as u64, text_field => text.as_str())).map_err(Error::storage)?;
		}
		writer.commit().map_err(Error::storage)?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into().map_err(Error::storage)?;
		let searcher = reader.searcher();
		debug!(docs = texts.len(), elapsed_ms = started.elapsed().as_millis() as u64, "sparse index rebuilt");
		Ok(Self { built: Some(Built { searcher, id_field, text_field, len: texts.len() }) })
	}

	pub fn rebuild(&mut self, texts: &[String]) -> Result<()> {
		*self = Self::build(texts)?;
		Ok(())
	}

	pub fn is_built(&self) -> bool { self.built.is_some() }

	/// Number of texts covered by the last build.
	pub fn len(&self) -> usize { self.built.as_ref().map_or(0, |b| b.len) }

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	/// One BM25 score per passage id, in id order.
	pub fn score(&self, query: &str) -> Result<Vec<f32>> {
		let built = self.built.as_ref().ok_or(Error::IndexUnavailable("sparse index not built"))?;
		let mut scores = vec![0f32; built.len];
		let terms = tokenize(query);
		if built.len == 0 || terms.is_empty() { return Ok(scores); }
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let q = TermQuery::new(Term::from_field_text(built.text_field, t), IndexRecordOption::WithFreqs);
				(Occur::Should, Box::new(q) as Box<dyn Query>)
			})
			.collect();
		let query = BooleanQuery::new(clauses);
		let top_docs = built.searcher.search(&query, &TopDocs::with_limit(built.len)).map_err(Error::storage)?;
		for (score, addr) in top_docs {
			let doc: TantivyDocument = built.searcher.doc(addr).map_err(Error::storage)?;
			let id = doc.get_first(built.id_field).and_then(|v| v.as_u64());
			if let Some(slot) = id.and_then(|id| scores.get_mut(id as usize)) { *slot = score.max(0.0); }
		}
		Ok(scores)
	}

	/// The `k` best ids with a positive score, ties broken by lower id.
	pub fn top_k(scores: &[f32], k: usize) -> Vec<(PassageId, f32)> {
		let mut ranked: Vec<(PassageId, f32)> = scores
			.iter()
			.enumerate()
			.filter(|(_, s)| **s > 0.0)
			.map(|(i, s)| (i as PassageId, *s))
			.collect();
		ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
		ranked.truncate(k);
		ranked
	}
}
