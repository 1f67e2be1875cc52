//! Search result and answer types

use super::ChunkRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A single search mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Token/phrase inverted-index search
    Lexical,
    /// Dense cosine-similarity search
    Vector,
    /// Weighted union of lexical and vector
    Hybrid,
    /// Date-range-filtered search
    Temporal,
}

impl StrategyKind {
    /// Short stable name used in logs and responses
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Lexical => "lexical",
            StrategyKind::Vector => "vector",
            StrategyKind::Hybrid => "hybrid",
            StrategyKind::Temporal => "temporal",
        }
    }

    /// Fixed consensus weight for this strategy's contribution.
    ///
    /// Lexical dominates to counter the semantic-drift failure mode of purely
    /// dense matching. Hybrid contributes through the vector weight.
    #[must_use]
    pub fn consensus_weight(self) -> f32 {
        use crate::constants::defaults;
        match self {
            StrategyKind::Lexical => defaults::STRATEGY_WEIGHT_LEXICAL,
            StrategyKind::Vector | StrategyKind::Hybrid => defaults::STRATEGY_WEIGHT_VECTOR,
            StrategyKind::Temporal => defaults::STRATEGY_WEIGHT_TEMPORAL,
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A highlighted span inside the recording text, as (offset, len).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HighlightSpan {
    /// Character offset into the recording text
    pub offset: usize,
    /// Span length in characters
    pub len: usize,
}

/// One scored hit against the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The matched recording
    pub recording_id: String,
    /// Normalised score in [0, 1]
    pub score: f32,
    /// Strategies that found this recording
    pub matching_strategies: BTreeSet<StrategyKind>,
    /// Matched spans, merged across strategies
    pub highlight_spans: Vec<HighlightSpan>,
    /// Best-matching chunk, when the hit came through the vector index
    pub chunk_ref: Option<ChunkRef>,
    /// Recording start, carried for deterministic tie-breaking
    pub start_time: DateTime<Utc>,
}

impl SearchResult {
    /// Build a single-strategy result.
    #[must_use]
    pub fn new(
        recording_id: impl Into<String>,
        score: f32,
        strategy: StrategyKind,
        start_time: DateTime<Utc>,
    ) -> Self {
        let mut matching_strategies = BTreeSet::new();
        matching_strategies.insert(strategy);
        Self {
            recording_id: recording_id.into(),
            score: score.clamp(0.0, 1.0),
            matching_strategies,
            highlight_spans: Vec::new(),
            chunk_ref: None,
            start_time,
        }
    }

    /// Attach highlight spans
    #[must_use]
    pub fn with_spans(mut self, spans: Vec<HighlightSpan>) -> Self {
        self.highlight_spans = spans;
        self
    }

    /// Attach the best-matching chunk reference
    #[must_use]
    pub fn with_chunk(mut self, chunk_ref: ChunkRef) -> Self {
        self.chunk_ref = Some(chunk_ref);
        self
    }
}

/// Deterministic result ordering: score desc, then newer start, then id.
#[must_use]
pub fn result_ordering(a: &SearchResult, b: &SearchResult) -> std::cmp::Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.start_time.cmp(&a.start_time))
        .then_with(|| a.recording_id.cmp(&b.recording_id))
}

/// The merged output of one executor round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Consensus-ranked results, caller-bounded
    pub results: Vec<SearchResult>,
    /// Strategies that failed or timed out this round
    pub failed_strategies: BTreeSet<StrategyKind>,
    /// True when at least one strategy failed
    pub degraded: bool,
    /// True when the query was cancelled and these are partial results
    pub cancelled: bool,
    /// Human-readable partial-failure notes
    pub warnings: Vec<String>,
}

/// Where a final answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerSource {
    /// Served from the answer cache without running the executor
    Cache,
    /// Produced by local search rounds
    Search,
    /// Produced by the external reasoner
    Reasoner,
}

/// The final, user-facing answer to a question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineAnswer {
    /// Answer text (a summary line plus the top citations)
    pub answer_text: String,
    /// Terminal confidence in [0, 1]
    pub confidence: f32,
    /// Recordings the answer is grounded on
    pub citations: Vec<String>,
    /// Provenance of the answer
    pub source: AnswerSource,
    /// Search rounds executed (0 for a cache hit)
    pub rounds: usize,
    /// Partial-failure notes accumulated across rounds
    pub warnings: Vec<String>,
    /// True when the query was cancelled mid-flight
    pub cancelled: bool,
}
