use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED};
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, TokenStream, WhitespaceTokenizer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "lower_whitespace";
pub const ID_FIELD: &str = "id";
pub const TEXT_FIELD: &str = "text";

/// `id` is the passage id; `text` is indexed with term frequencies, not stored.
pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _id_field = schema_builder.add_u64_field(ID_FIELD, INDEXED | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(TOKENIZER_NAME).set_index_option(IndexRecordOption::WithFreqs);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	let _text_field = schema_builder.add_text_field(TEXT_FIELD, text_options);
	schema_builder.build()
}

pub fn analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(WhitespaceTokenizer::default())
		.filter(LowerCaser)
		.build()
}

pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(TOKENIZER_NAME, analyzer());
}

/// Tokens exactly as the index sees them.
pub fn tokenize(text: &str) -> Vec<String> {
	let mut analyzer = analyzer();
	let mut stream = analyzer.token_stream(text);
	let mut out = Vec::new();
	while stream.advance() { out.push(stream.token().text.clone()); }
	out
}
