//! # Lifelog filesystem storage
//!
//! Date-sharded filesystem backend for the lifelog search engine,
//! implementing the stable on-disk layout:
//!
//! ```text
//! <dataDir>/
//!   recordings/YYYY/MM/DD/<id>.body   fixed-header UTF-8 body
//!   recordings/YYYY/MM/DD/<id>.meta   JSON metadata sidecar
//!   embeddings/YYYY/MM/DD/<id>.vec    JSON chunk-embedding sidecar
//!   checkpoint.json                   sync pipeline progress
//!   answers/<fingerprint>.json        cached high-confidence answers
//! ```
//!
//! Every write is write-tmp + rename, so no partial artifact is ever
//! visible under its final name. The store is single-writer (the sync
//! service) and multi-reader.

mod answers;
mod checkpoint;
mod paths;
mod store;

pub use answers::FsAnswerStore;
pub use checkpoint::FsCheckpointStore;
pub use store::FsCorpusStore;
