//! Dense half of the passage store.
//!
//! [`LanceVectorIndex`] keeps one `(id, vector)` row per passage in a LanceDB table
//! and answers exact L2 nearest-neighbour queries. [`Corpus`] owns the passage texts
//! and metadata next to it and keeps all three sequences the same length.

pub mod corpus;
pub mod index;
pub mod schema;
pub mod table;

pub use corpus::{Corpus, SideRecordWriter};
pub use index::LanceVectorIndex;
