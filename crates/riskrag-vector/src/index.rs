use arrow_array::{Array, Float32Array, RecordBatch, UInt64Array};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use tracing::{debug, info};

use riskrag_core::error::{Error, Result};
use riskrag_core::types::PassageId;

use crate::schema::{vector_dim, DISTANCE_COLUMN, ID_COLUMN};
use crate::table::{append, count_rows, open_db, open_table_if_exists, to_record_batch};

/// Exact L2 nearest-neighbour index over `(id, vector)` rows in one LanceDB table.
///
/// Searches are brute force (no ANN index is trained), so results are exact.
pub struct LanceVectorIndex {
	conn: Connection,
	table_name: String,
	table: Option<Table>,
	dim: usize,
	len: usize,
}

impl LanceVectorIndex {
	/// Open (or lazily create) `table_name` under `db_dir`.
	pub async fn open(db_dir: &Path, table_name: &str, dim: usize) -> Result<Self> {
		let conn = open_db(db_dir.to_string_lossy().as_ref()).await?;
		let table = open_table_if_exists(&conn, table_name).await?;
		let len = match &table {
			Some(t) => {
				let schema = t.schema().await.map_err(Error::storage)?;
				match vector_dim(&schema) {
					Some(got) if got == dim => {}
					Some(got) => return Err(Error::DimensionMismatch { expected: dim, got }),
					None => return Err(Error::CorpusCorruption(format!("table '{table_name}' has no vector column"))),
				}
				count_rows(t).await?
			}
			None => 0,
		};
		info!(table = table_name, rows = len, dim, "opened dense index");
		Ok(Self { conn, table_name: table_name.to_string(), table, dim, len })
	}

	pub fn dim(&self) -> usize { self.dim }
	pub fn len(&self) -> usize { self.len }
	pub fn is_empty(&self) -> bool { self.len == 0 }

	pub fn check_dim(&self, vector: &[f32]) -> Result<()> {
		if vector.len() == self.dim { Ok(()) } else { Err(Error::DimensionMismatch { expected: self.dim, got: vector.len() }) }
	}

	/// Append one row per `(id, vector)` pair as a single table write.
	pub async fn add(&mut self, ids: &[PassageId], vectors: &[Vec<f32>]) -> Result<()> {
		if ids.len() != vectors.len() {
			return Err(Error::ShapeMismatch { texts: ids.len(), metadatas: ids.len(), vectors: vectors.len() });
		}
		if vectors.is_empty() { return Ok(()); }
		for v in vectors { self.check_dim(v)?; }
		let batch = to_record_batch(ids, vectors, self.dim)?;
		let table = append(&self.conn, self.table.as_ref(), &self.table_name, batch).await?;
		self.table = Some(table);
		self.len += vectors.len();
		debug!(added = vectors.len(), rows = self.len, "dense rows appended");
		Ok(())
	}

	/// Drop every row whose id is `len` or above.
	pub async fn truncate(&mut self, len: usize) -> Result<()> {
		let Some(table) = &self.table else { return Ok(()) };
		if self.len <= len { return Ok(()); }
		table.delete(&format!("{ID_COLUMN} >= {len}")).await.map_err(Error::storage)?;
		let dropped = self.len;
		self.len = count_rows(table).await?;
		info!(table = %self.table_name, dropped = dropped.saturating_sub(self.len), rows = self.len, "dense tail truncated");
		Ok(())
	}

	/// Up to `k` `(id, distance)` pairs, closest first, ties broken by lower id.
	pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<(PassageId, f32)>> {
		let Some(table) = &self.table else { return Ok(Vec::new()) };
		if k == 0 || self.len == 0 { return Ok(Vec::new()); }
		self.check_dim(query)?;
		let batches: Vec<RecordBatch> = table
			.vector_search(query.to_vec())
			.map_err(Error::storage)?
			.distance_type(DistanceType::L2)
			.limit(k)
			.execute()
			.await
			.map_err(Error::storage)?
			.try_collect()
			.await
			.map_err(Error::storage)?;
		let mut hits = Vec::with_capacity(k);
		for batch in &batches { read_hits(batch, &mut hits)?; }
		hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
		hits.truncate(k);
		Ok(hits)
	}
}

fn read_hits(batch: &RecordBatch, out: &mut Vec<(PassageId, f32)>) -> Result<()> {
	let ids = batch
		.column_by_name(ID_COLUMN)
		.and_then(|c| c.as_any().downcast_ref::<UInt64Array>())
		.ok_or(Error::IndexUnavailable("dense result without id column"))?;
	let distances = batch
		.column_by_name(DISTANCE_COLUMN)
		.and_then(|c| c.as_any().downcast_ref::<Float32Array>())
		.ok_or(Error::IndexUnavailable("dense result without distance column"))?;
	for i in 0..batch.num_rows() {
		if ids.is_null(i) || distances.is_null(i) { continue; }
		// LanceDB reports squared L2.
		out.push((ids.value(i), distances.value(i).max(0.0).sqrt()));
	}
	Ok(())
}
