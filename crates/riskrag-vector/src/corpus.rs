//! Passage texts, metadata and vectors kept in lockstep.
//!
//! Vectors live in the LanceDB table, texts and metadata in a JSON side-record
//! `<index_dir>/<table>.passages.json`. The side-record is rewritten atomically on
//! [`Corpus::persist`] and is the commit point of a batch: vector rows past its
//! length belong to a batch that never committed and are dropped on
//! [`Corpus::restore`]. Any other disagreement in length is corruption.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use riskrag_core::error::{Error, Result};
use riskrag_core::types::{Meta, Passage, PassageId, SOURCE_KEY};

use crate::index::LanceVectorIndex;

#[derive(Serialize)]
struct SideRecordRef<'a> {
	texts: &'a [String],
	metadatas: &'a [Meta],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SideRecord {
	Full { texts: Vec<String>, metadatas: Vec<Meta> },
	/// Older stores only kept the texts.
	Legacy(Vec<String>),
}

pub struct Corpus {
	texts: Vec<String>,
	metadatas: Vec<Meta>,
	dense: LanceVectorIndex,
	side_record: PathBuf,
}

impl Corpus {
	pub fn side_record_path(index_dir: &Path, table: &str) -> PathBuf {
		index_dir.join(format!("{table}.passages.json"))
	}

	/// Load whatever is stored under `index_dir`; a missing store is an empty corpus.
	pub async fn restore(index_dir: &Path, table: &str, dim: usize) -> Result<Self> {
		fs::create_dir_all(index_dir)?;
		let mut dense = LanceVectorIndex::open(index_dir, table, dim).await?;
		let side_record = Self::side_record_path(index_dir, table);
		let (texts, metadatas) = read_side_record(&side_record)?;
		if texts.len() == metadatas.len() && dense.len() > texts.len() {
			warn!(
				committed = texts.len(),
				rows = dense.len(),
				"dropping vector rows of a batch that was never committed to the side-record"
			);
			dense.truncate(texts.len()).await?;
		}
		if texts.len() != metadatas.len() || texts.len() != dense.len() {
			return Err(Error::CorpusCorruption(format!(
				"{} holds {} texts and {} metadatas but table '{}' holds {} vectors",
				side_record.display(),
				texts.len(),
				metadatas.len(),
				table,
				dense.len()
			)));
		}
		info!(passages = texts.len(), store = %index_dir.display(), "corpus restored");
		Ok(Self { texts, metadatas, dense, side_record })
	}

	pub fn len(&self) -> usize { self.texts.len() }
	pub fn is_empty(&self) -> bool { self.texts.is_empty() }
	pub fn dim(&self) -> usize { self.dense.dim() }
	pub fn texts(&self) -> &[String] { &self.texts }
	pub fn dense(&self) -> &LanceVectorIndex { &self.dense }

	pub fn text(&self, id: PassageId) -> Option<&str> {
		usize::try_from(id).ok().and_then(|i| self.texts.get(i)).map(String::as_str)
	}

	pub fn metadata(&self, id: PassageId) -> Option<&Meta> {
		usize::try_from(id).ok().and_then(|i| self.metadatas.get(i))
	}

	pub fn passage(&self, id: PassageId) -> Option<Passage> {
		Some(Passage { id, text: self.text(id)?.to_string(), metadata: self.metadata(id)?.clone() })
	}

	/// Append aligned texts, metadata and vectors; returns the ids assigned.
	///
	/// Shape and dimension are checked before anything is written, so a rejected
	/// batch leaves the corpus as it was. The batch is not durable until
	/// [`Corpus::persist`] succeeds; undo it with [`Corpus::rollback_to`] otherwise.
	pub async fn append_batch(
		&mut self,
		texts: Vec<String>,
		metadatas: Option<Vec<Meta>>,
		vectors: Vec<Vec<f32>>,
	) -> Result<Range<PassageId>> {
		let metadatas = metadatas.unwrap_or_else(|| vec![Meta::new(); texts.len()]);
		if texts.len() != vectors.len() || metadatas.len() != texts.len() {
			return Err(Error::ShapeMismatch { texts: texts.len(), metadatas: metadatas.len(), vectors: vectors.len() });
		}
		for v in &vectors { self.dense.check_dim(v)?; }
		if self.dense.len() != self.texts.len() {
			self.dense.truncate(self.texts.len()).await?;
		}
		let start = self.texts.len() as PassageId;
		let end = start + texts.len() as PassageId;
		if texts.is_empty() { return Ok(start..end); }
		let ids: Vec<PassageId> = (start..end).collect();
		self.dense.add(&ids, &vectors).await?;
		self.texts.extend(texts);
		self.metadatas.extend(metadatas);
		Ok(start..end)
	}

	/// Undo every append past the first `len` passages.
	pub async fn rollback_to(&mut self, len: usize) -> Result<()> {
		self.texts.truncate(len);
		self.metadatas.truncate(len);
		self.dense.truncate(len).await
	}

	/// Whether any passage was cut from the file named `source`.
	pub fn has_source(&self, source: &str) -> bool {
		self.metadatas.iter().any(|m| m.get(SOURCE_KEY).is_some_and(|s| s == source))
	}

	/// Owned copy of the side-record contents, writable off the async runtime.
	pub fn side_record(&self) -> SideRecordWriter {
		SideRecordWriter { path: self.side_record.clone(), texts: self.texts.clone(), metadatas: self.metadatas.clone() }
	}

	/// Rewrite the side-record, committing every batch appended so far.
	pub fn persist(&self) -> Result<()> {
		self.side_record().write()
	}
}

pub struct SideRecordWriter {
	path: PathBuf,
	texts: Vec<String>,
	metadatas: Vec<Meta>,
}

impl SideRecordWriter {
	/// Atomic replace: temp file in the same directory, fsync, rename.
	pub fn write(&self) -> Result<()> {
		let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
		fs::create_dir_all(dir)?;
		let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
		{
			let mut writer = BufWriter::new(tmp.as_file_mut());
			serde_json::to_writer(&mut writer, &SideRecordRef { texts: &self.texts, metadatas: &self.metadatas })
				.map_err(Error::storage)?;
			writer.flush()?;
		}
		tmp.as_file().sync_all()?;
		tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
		info!(passages = self.texts.len(), path = %self.path.display(), "corpus persisted");
		Ok(())
	}
}

fn read_side_record(path: &Path) -> Result<(Vec<String>, Vec<Meta>)> {
	if !path.exists() { return Ok((Vec::new(), Vec::new())); }
	let raw = fs::read_to_string(path)?;
	let record: SideRecord = serde_json::from_str(&raw)
		.map_err(|e| Error::CorpusCorruption(format!("unreadable side-record {}: {e}", path.display())))?;
	Ok(match record {
		SideRecord::Full { texts, metadatas } => (texts, metadatas),
		SideRecord::Legacy(texts) => {
			warn!(path = %path.display(), "legacy side-record without metadata; filters will not match these passages");
			let metadatas = vec![Meta::new(); texts.len()];
			(texts, metadatas)
		}
	})
}
