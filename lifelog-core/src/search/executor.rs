//! Parallel strategy executor
//!
//! Fans the strategies out concurrently, enforces the per-strategy deadline,
//! and collects whatever came back in time. A strategy that fails or times
//! out is recorded and never aborts its siblings; the round it produced is
//! simply marked degraded.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::search::context::SharedContext;
use crate::search::strategy::SearchStrategy;
use crate::types::{AnalyzedQuery, SearchResult, StrategyKind};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

/// Raw per-strategy output of one fan-out round, before consensus.
#[derive(Debug, Default)]
pub struct ExecutorRound {
    /// Results per strategy, in deterministic strategy order
    pub per_strategy: Vec<(StrategyKind, Vec<SearchResult>)>,
    /// Strategies that failed or timed out
    pub failed: BTreeSet<StrategyKind>,
    /// True when the cancel token fired during the round
    pub cancelled: bool,
    /// Partial-failure notes, one per failed strategy
    pub warnings: Vec<String>,
}

impl ExecutorRound {
    /// True when at least one strategy failed
    #[must_use]
    pub fn degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Concurrent fan-out over the strategy set.
pub struct ParallelExecutor {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    config: Arc<EngineConfig>,
}

impl ParallelExecutor {
    /// Build an executor over a fixed strategy set
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn SearchStrategy>>, config: Arc<EngineConfig>) -> Self {
        Self { strategies, config }
    }

    /// Run every strategy concurrently against the shared context.
    ///
    /// Returns once all strategies completed or their deadline fired; late
    /// results are dropped with the timed-out task.
    #[instrument(skip_all, fields(k = k))]
    pub async fn execute(
        &self,
        query: &Arc<AnalyzedQuery>,
        k: usize,
        ctx: &Arc<SharedContext>,
        cancel: &CancelToken,
    ) -> ExecutorRound {
        let mut round = ExecutorRound::default();
        if cancel.is_cancelled() {
            round.cancelled = true;
            return round;
        }

        // One snapshot per round: every strategy reads the same state, which
        // keeps a round deterministic regardless of completion order.
        let snapshot = Arc::new(ctx.snapshot());

        let mut tasks: JoinSet<(StrategyKind, Result<Vec<SearchResult>, Error>)> = JoinSet::new();
        for strategy in &self.strategies {
            let strategy = Arc::clone(strategy);
            let query = Arc::clone(query);
            let ctx = Arc::clone(ctx);
            let snapshot = Arc::clone(&snapshot);
            let cancel = cancel.clone();
            let deadline = self.config.strategy_deadline;
            tasks.spawn(async move {
                let kind = strategy.kind();
                let outcome = match tokio::time::timeout(
                    deadline,
                    strategy.run(&query, k, &ctx, &snapshot, &cancel),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(Error::Timeout),
                };
                (kind, outcome)
            });
        }

        let mut collected: Vec<(StrategyKind, Vec<SearchResult>)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((kind, Ok(results))) => {
                    debug!(strategy = %kind, hits = results.len(), "strategy completed");
                    collected.push((kind, results));
                }
                Ok((kind, Err(error))) => {
                    warn!(strategy = %kind, code = error.code(), %error, "strategy failed");
                    round.failed.insert(kind);
                    round
                        .warnings
                        .push(format!("{kind} strategy failed: {} ({})", error, error.code()));
                }
                Err(join_error) => {
                    // A panicked task loses its kind attribution; record the
                    // degradation without it.
                    warn!(%join_error, "strategy task aborted");
                    round.warnings.push(format!("strategy task aborted: {join_error}"));
                }
            }
        }

        // Completion order is racy; fix it for determinism.
        collected.sort_by_key(|(kind, _)| *kind);
        round.per_strategy = collected;
        round.cancelled = cancel.is_cancelled();
        round
    }
}
