//! Core data model shared across the engine
//!
//! The corpus store owns [`Recording`], [`RecordingMetadata`], [`Chunk`] and
//! [`ChunkEmbedding`]; the indexes borrow read-only views of them. Search
//! strategies produce [`SearchResult`] values that the consensus ranker merges
//! into a [`SearchResponse`].

mod chunk;
mod query;
mod recording;
mod results;

pub use chunk::{Chunk, ChunkEmbedding, ChunkRef};
pub use query::{AnalyzedQuery, EntityKind, EntityRef, QueryIntent, RelativeExpr, TemporalHint};
pub use recording::{content_hash, Recording, RecordingMetadata};
pub use results::{
    result_ordering, AnswerSource, EngineAnswer, HighlightSpan, SearchResponse, SearchResult,
    StrategyKind,
};
