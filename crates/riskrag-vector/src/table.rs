//! LanceDB connection and table helpers.
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, UInt64Array};
use lancedb::{connect, Connection, Table};
use std::sync::Arc;

use riskrag_core::error::{Error, Result};
use riskrag_core::types::PassageId;

use crate::schema::build_arrow_schema;

pub async fn open_db(uri: &str) -> Result<Connection> {
	connect(uri).execute().await.map_err(Error::storage)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
	let names = conn.table_names().execute().await.map_err(Error::storage)?;
	Ok(names.iter().any(|n| n == name))
}

pub async fn open_table_if_exists(conn: &Connection, name: &str) -> Result<Option<Table>> {
	if !table_exists(conn, name).await? { return Ok(None); }
	conn.open_table(name).execute().await.map(Some).map_err(Error::storage)
}

pub async fn count_rows(table: &Table) -> Result<usize> {
	table.count_rows(None).await.map_err(Error::storage)
}

/// One record batch of `(id, vector)` rows; every vector must already be `dim` wide.
pub fn to_record_batch(ids: &[PassageId], vectors: &[Vec<f32>], dim: usize) -> Result<RecordBatch> {
	let rows = vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
	RecordBatch::try_new(
		build_arrow_schema(dim),
		vec![
			Arc::new(UInt64Array::from(ids.to_vec())),
			Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(rows, dim as i32)),
		],
	)
	.map_err(Error::storage)
}

/// Append `batch` to `table`, creating the table on first write.
pub async fn append(conn: &Connection, table: Option<&Table>, name: &str, batch: RecordBatch) -> Result<Table> {
	let schema = batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
	match table {
		Some(t) => {
			t.add(reader).execute().await.map_err(Error::storage)?;
			Ok(t.clone())
		}
		None => conn.create_table(name, reader).execute().await.map_err(Error::storage),
	}
}
