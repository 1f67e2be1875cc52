//! External reasoning model capability

use crate::error::Result;
use crate::types::SearchResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the reasoner decided to do with the evidence it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReasonerVerdict {
    /// A final answer, ready to surface
    FinalAnswer {
        /// Answer text
        text: String,
        /// Reasoner-assessed confidence in [0, 1]
        confidence: f32,
        /// Recording ids the answer cites
        citations: Vec<String>,
    },
    /// A request for one more local search round with a refined query
    Refine {
        /// The refined query to search for
        query: String,
    },
}

/// Last-resort escalation target when local confidence stays low.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Assess the question against the top local evidence.
    ///
    /// # Errors
    ///
    /// Returns `ReasonerUnavailable` when the capability cannot be reached;
    /// the iterative loop treats that as a terminal escalation failure and
    /// falls back to its best local answer.
    async fn assess(&self, prompt: &str, evidence: &[SearchResult]) -> Result<ReasonerVerdict>;
}
