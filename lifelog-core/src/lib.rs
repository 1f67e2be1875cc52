#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::float_cmp)]

//! # Lifelog Core
//!
//! A local, multi-strategy retrieval engine answering natural-language
//! questions over a corpus of timestamped, speaker-attributed transcripts.
//! Everything runs over locally stored data; no remote service is consulted
//! at query time.
//!
//! ## Query path
//!
//! A question flows through the [`query::QueryAnalyzer`], fans out across
//! the [`search::strategy`] set on the [`search::ParallelExecutor`] (the
//! strategies trading hints through a per-query [`search::SharedContext`]),
//! gets merged by [`search::consensus`], and is assessed by the
//! [`search::IterativeSearchLoop`], which refines locally and escalates to
//! an external [`capabilities::Reasoner`] only as a last resort. Confident
//! answers are memoised in the [`cache::AnswerCache`].
//!
//! ## Ingest path
//!
//! The [`sync::SyncService`] walks the rate-limited
//! [`capabilities::RecordingSource`] day by day into the
//! [`store::CorpusStore`], then chunks and embeds everything into the
//! [`index::VectorIndex`] and feeds the [`index::LexicalIndex`].
//!
//! ## Module organization
//!
//! - [`engine`]: the facade tying cache, loop and indexes together
//! - [`types`]: recordings, chunks, results, answers
//! - [`store`]: corpus ownership, body format, chunking, validation
//! - [`index`]: lexical (BM25) and vector (cosine) indexes
//! - [`query`]: analyzer and temporal resolution
//! - [`search`]: context, strategies, executor, consensus, iterative loop
//! - [`sync`]: checkpointed download/index/monitor pipeline
//! - [`cache`]: content-addressed answer memoisation
//! - [`capabilities`]: the source/encoder/reasoner seams

pub mod cache;
pub mod cancel;
pub mod capabilities;
pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod index;
pub mod query;
pub mod retry;
pub mod search;
pub mod store;
pub mod sync;
pub mod text;
pub mod types;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use engine::SearchEngine;
pub use error::{Error, Result};
pub use types::{
    AnalyzedQuery, AnswerSource, Chunk, ChunkEmbedding, EngineAnswer, HighlightSpan, Recording,
    RecordingMetadata, SearchResponse, SearchResult, StrategyKind,
};
