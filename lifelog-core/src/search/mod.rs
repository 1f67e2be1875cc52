//! Query-side orchestration
//!
//! The pipeline for one question: the analyzer's structured query fans out
//! through the [`executor`] over the [`strategy`] set, strategies talk to
//! each other through the [`context`], the [`consensus`] ranker merges the
//! round, [`confidence`] assesses it, and the [`iterative`] loop decides
//! whether to return, refine, or escalate.

pub mod confidence;
pub mod consensus;
pub mod context;
pub mod executor;
pub mod iterative;
pub mod strategy;

pub use confidence::local_confidence;
pub use consensus::ConsensusResult;
pub use context::{ContextSnapshot, SharedContext};
pub use executor::{ExecutorRound, ParallelExecutor};
pub use iterative::{IterationRecord, IterativeSearchLoop, LoopOutcome, SearchPhase};
pub use strategy::{
    default_strategies, HybridStrategy, LexicalStrategy, SearchStrategy, TemporalStrategy,
    VectorStrategy,
};
