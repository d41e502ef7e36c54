use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const VECTOR_COLUMN: &str = "vector";
/// Column LanceDB appends to vector search results.
pub const DISTANCE_COLUMN: &str = "_distance";

pub fn build_arrow_schema(dim: usize) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ID_COLUMN, DataType::UInt64, false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32), true),
	]))
}

/// Width of the vector column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
		DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn schema_reports_its_dimension() {
		assert_eq!(vector_dim(&build_arrow_schema(8)), Some(8));
		assert_eq!(vector_dim(&Schema::new(vec![Field::new(ID_COLUMN, DataType::UInt64, false)])), None);
	}
}
