//! In-memory search indexes
//!
//! Both indexes are append-only from the ingest side and read-only from the
//! query side. Updates become visible atomically at batch boundaries: each
//! committed batch bumps a generation counter, and a query run against one
//! generation sees a consistent snapshot of it.

pub mod lexical;
pub mod vector;

pub use lexical::LexicalIndex;
pub use vector::{IndexMetadata, VectorIndex};
