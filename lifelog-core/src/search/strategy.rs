//! Search strategies
//!
//! Each strategy is one search mechanism behind a common trait so the
//! executor can fan them out uniformly. Strategies normalise their scores to
//! [0, 1] before returning (the consensus weights assume it), publish what
//! they learned into the shared context, and poll the cancel token at
//! natural checkpoints.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::capabilities::Encoder;
use crate::error::Result;
use crate::index::{LexicalIndex, VectorIndex};
use crate::search::context::{ContextSnapshot, SharedContext};
use crate::types::{AnalyzedQuery, SearchResult, StrategyKind};
use async_trait::async_trait;
use std::sync::Arc;

/// A single search mechanism.
///
/// Strategies read inter-strategy state from `snapshot` (taken once at the
/// start of the round, so a round is deterministic) and publish what they
/// learn into the live `ctx` for the next round.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Which strategy this is, for attribution and weighting
    fn kind(&self) -> StrategyKind;

    /// Run the strategy.
    ///
    /// # Errors
    ///
    /// A failing strategy returns an error; the executor records it and
    /// keeps the siblings running (partial-failure contract).
    async fn run(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>>;
}

/// Token/phrase inverted-index search.
pub struct LexicalStrategy {
    index: Arc<LexicalIndex>,
}

impl LexicalStrategy {
    /// Wrap the shared lexical index
    #[must_use]
    pub fn new(index: Arc<LexicalIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SearchStrategy for LexicalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Lexical
    }

    async fn run(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let results = self.index.search(query, k, ctx, snapshot);
        ctx.record_confidence(self.kind(), results.first().map_or(0.0, |r| r.score));
        Ok(results)
    }
}

/// Dense cosine-similarity search.
pub struct VectorStrategy {
    index: Arc<VectorIndex>,
    encoder: Arc<dyn Encoder>,
    config: Arc<EngineConfig>,
}

impl VectorStrategy {
    /// Wrap the shared vector index and encoder
    #[must_use]
    pub fn new(index: Arc<VectorIndex>, encoder: Arc<dyn Encoder>, config: Arc<EngineConfig>) -> Self {
        Self {
            index,
            encoder,
            config,
        }
    }
}

#[async_trait]
impl SearchStrategy for VectorStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Vector
    }

    async fn run(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let results = self
            .index
            .search(&query.raw, k, None, snapshot, self.encoder.as_ref(), &self.config, cancel)
            .await?;
        ctx.record_confidence(self.kind(), results.first().map_or(0.0, |r| r.score));
        Ok(results)
    }
}

/// BM25 + vector weighted union.
pub struct HybridStrategy {
    lexical: Arc<LexicalIndex>,
    vector: Arc<VectorIndex>,
    encoder: Arc<dyn Encoder>,
    config: Arc<EngineConfig>,
}

impl HybridStrategy {
    /// Wrap both shared indexes
    #[must_use]
    pub fn new(
        lexical: Arc<LexicalIndex>,
        vector: Arc<VectorIndex>,
        encoder: Arc<dyn Encoder>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            lexical,
            vector,
            encoder,
            config,
        }
    }
}

#[async_trait]
impl SearchStrategy for HybridStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }

    async fn run(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let results = self
            .vector
            .hybrid_search(
                query,
                k,
                ctx,
                snapshot,
                self.encoder.as_ref(),
                &self.lexical,
                &self.config,
                cancel,
            )
            .await?;
        ctx.record_confidence(self.kind(), results.first().map_or(0.0, |r| r.score));
        Ok(results)
    }
}

/// Date-range-filtered lexical search.
///
/// Contributes nothing when the query carries no temporal hint; that is a
/// normal empty result, not a failure.
pub struct TemporalStrategy {
    index: Arc<LexicalIndex>,
}

impl TemporalStrategy {
    /// Wrap the shared lexical index
    #[must_use]
    pub fn new(index: Arc<LexicalIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SearchStrategy for TemporalStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Temporal
    }

    async fn run(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }
        let Some(range) = query.temporal.date_range else {
            return Ok(Vec::new());
        };
        let mut results = self.index.search_filtered(query, k, ctx, snapshot, Some(range));
        for result in &mut results {
            result.matching_strategies.clear();
            result.matching_strategies.insert(StrategyKind::Temporal);
        }
        ctx.add_dates([range.0, range.1]);
        ctx.record_confidence(self.kind(), results.first().map_or(0.0, |r| r.score));
        Ok(results)
    }
}

/// The default strategy set, in deterministic order.
#[must_use]
pub fn default_strategies(
    lexical: Arc<LexicalIndex>,
    vector: Arc<VectorIndex>,
    encoder: Arc<dyn Encoder>,
    config: Arc<EngineConfig>,
) -> Vec<Arc<dyn SearchStrategy>> {
    vec![
        Arc::new(LexicalStrategy::new(Arc::clone(&lexical))),
        Arc::new(VectorStrategy::new(
            Arc::clone(&vector),
            Arc::clone(&encoder),
            Arc::clone(&config),
        )),
        Arc::new(HybridStrategy::new(
            Arc::clone(&lexical),
            vector,
            encoder,
            config,
        )),
        Arc::new(TemporalStrategy::new(lexical)),
    ]
}
