//! Iterative search loop
//!
//! The confidence-driven cycle that answers a user-facing question:
//!
//! ```text
//! Initial -> Searching -> Assessing -> (Refining -> Searching)*
//!                                   -> (Escalating -> Searching)* -> Done
//! ```
//!
//! Implemented as an explicit state machine with hard budgets (refinement
//! rounds, escalation cycles, wall clock) so pathological inputs cannot
//! stall the process. Every transition is logged with its iteration index
//! and persisted under a per-session directory so failures reproduce.

use crate::cancel::CancelToken;
use crate::capabilities::{Reasoner, ReasonerVerdict};
use crate::config::EngineConfig;
use crate::query::QueryAnalyzer;
use crate::search::confidence::local_confidence;
use crate::search::consensus::{self, ConsensusResult};
use crate::search::context::SharedContext;
use crate::search::executor::ParallelExecutor;
use crate::types::{AnalyzedQuery, AnswerSource, EngineAnswer, SearchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// How many citations a final answer carries.
const MAX_CITATIONS: usize = 5;
/// Extra context terms folded into one refinement variant.
const REFINEMENT_TERMS: usize = 3;

/// States of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPhase {
    Initial,
    Searching,
    Assessing,
    Refining,
    Escalating,
    Done,
}

impl std::fmt::Display for SearchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SearchPhase::Initial => "initial",
            SearchPhase::Searching => "searching",
            SearchPhase::Assessing => "assessing",
            SearchPhase::Refining => "refining",
            SearchPhase::Escalating => "escalating",
            SearchPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// One persisted loop iteration, enough to replay what happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Zero-based iteration index
    pub iteration: usize,
    /// Phase that produced this record
    pub phase: SearchPhase,
    /// Query text searched this iteration
    pub query: String,
    /// Local confidence after the round
    pub confidence: f32,
    /// Result count after consensus
    pub result_count: usize,
    /// Strategies that failed this round
    pub failed_strategies: Vec<String>,
    /// Evidence: the top recording ids
    pub evidence: Vec<String>,
    /// Wall-clock timestamp of the record
    pub recorded_at: DateTime<Utc>,
}

/// The loop's final product: the answer plus the results it came from.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// User-facing answer
    pub answer: EngineAnswer,
    /// Final consensus-ranked results
    pub results: Vec<SearchResult>,
}

/// Confidence-driven refinement loop with bounded escalation.
pub struct IterativeSearchLoop {
    executor: ParallelExecutor,
    analyzer: QueryAnalyzer,
    config: Arc<EngineConfig>,
    reasoner: Option<Arc<dyn Reasoner>>,
    session_root: Option<PathBuf>,
}

impl IterativeSearchLoop {
    /// Build a loop over an executor. A reasoner is optional; without one,
    /// escalation is skipped and the best local answer wins.
    #[must_use]
    pub fn new(executor: ParallelExecutor, config: Arc<EngineConfig>) -> Self {
        Self {
            executor,
            analyzer: QueryAnalyzer::new(),
            config,
            reasoner: None,
            session_root: None,
        }
    }

    /// Attach the escalation reasoner
    #[must_use]
    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Persist iteration records under `root/<session-id>/`
    #[must_use]
    pub fn with_session_root(mut self, root: PathBuf) -> Self {
        self.session_root = Some(root);
        self
    }

    /// Answer a question, refining and escalating as needed.
    ///
    /// Always emits an answer, marked with its terminal confidence; errors
    /// inside a round count as zero-confidence contributions rather than
    /// failures of the whole query.
    #[instrument(skip_all, fields(question = %question))]
    pub async fn run(
        &self,
        question: &str,
        now: DateTime<Utc>,
        k: usize,
        cancel: &CancelToken,
    ) -> LoopOutcome {
        let session = Uuid::new_v4();
        let session_dir = self.session_root.as_ref().map(|root| {
            let dir = root.join(session.to_string());
            if let Err(error) = std::fs::create_dir_all(&dir) {
                warn!(%error, "could not create session directory");
            }
            dir
        });

        let mut phase = SearchPhase::Initial;
        let mut iteration = 0usize;
        let mut refinements = 0usize;
        let mut escalations = 0usize;
        let mut warnings: Vec<String> = Vec::new();
        let mut best: Option<(Vec<ConsensusResult>, f32)> = None;
        let deadline = Instant::now() + self.config.query_deadline;

        let ctx = Arc::new(SharedContext::new());
        let mut current_query = Arc::new(self.analyzer.analyze(question, now));

        loop {
            self.transition(&mut phase, SearchPhase::Searching, iteration);
            let round = self.executor.execute(&current_query, k, &ctx, cancel).await;
            let ranked = consensus::merge(&round, k);
            warnings.extend(round.warnings.iter().cloned());

            self.transition(&mut phase, SearchPhase::Assessing, iteration);
            let confidence = local_confidence(&ranked);
            debug!(iteration, confidence, results = ranked.len(), "round assessed");

            let record = IterationRecord {
                iteration,
                phase,
                query: current_query.raw.clone(),
                confidence,
                result_count: ranked.len(),
                failed_strategies: round.failed.iter().map(|s| s.to_string()).collect(),
                evidence: ranked
                    .iter()
                    .take(MAX_CITATIONS)
                    .map(|r| r.result.recording_id.clone())
                    .collect(),
                recorded_at: Utc::now(),
            };
            Self::persist_record(session_dir.as_deref(), &record);

            if best.as_ref().is_none_or(|(_, c)| confidence > *c) {
                best = Some((ranked, confidence));
            }

            let cancelled = cancel.is_cancelled() || round.cancelled;
            let out_of_time = Instant::now() >= deadline;
            let confident = confidence >= self.config.early_return_threshold;

            if confident || cancelled || out_of_time {
                if out_of_time && !confident {
                    warnings.push("query wall-clock budget exhausted".to_string());
                }
                self.transition(&mut phase, SearchPhase::Done, iteration);
                return self.finish(question, best, warnings, iteration + 1, cancelled, AnswerSource::Search);
            }

            // Refine locally while the budget lasts.
            let variant = (refinements < self.config.max_refinements)
                .then(|| self.refine_query(question, &current_query, &ctx, now))
                .flatten();
            if let Some(variant) = variant {
                self.transition(&mut phase, SearchPhase::Refining, iteration);
                refinements += 1;
                iteration += 1;
                current_query = Arc::new(variant);
                continue;
            }

            // Local search is out of ideas; hand the evidence to the reasoner.
            let below_escalation = confidence < self.config.escalation_threshold;
            let reasoner = (below_escalation && escalations < self.config.max_escalations)
                .then_some(self.reasoner.as_ref())
                .flatten();
            if let Some(reasoner) = reasoner {
                self.transition(&mut phase, SearchPhase::Escalating, iteration);
                escalations += 1;
                let evidence: Vec<SearchResult> = best
                    .as_ref()
                    .map(|(ranked, _)| {
                        ranked
                            .iter()
                            .take(self.config.escalation_evidence_k)
                            .map(|r| r.result.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                let prompt = Self::escalation_prompt(question, iteration, &evidence);
                Self::persist_prompt(session_dir.as_deref(), escalations, &prompt);

                match reasoner.assess(&prompt, &evidence).await {
                    Ok(ReasonerVerdict::FinalAnswer {
                        text,
                        confidence,
                        citations,
                    }) => {
                        self.transition(&mut phase, SearchPhase::Done, iteration);
                        let results =
                            best.map(|(ranked, _)| Self::results_of(ranked)).unwrap_or_default();
                        return LoopOutcome {
                            answer: EngineAnswer {
                                answer_text: text,
                                confidence: confidence.clamp(0.0, 1.0),
                                citations,
                                source: AnswerSource::Reasoner,
                                rounds: iteration + 1,
                                warnings,
                                cancelled: false,
                            },
                            results,
                        };
                    }
                    Ok(ReasonerVerdict::Refine { query }) => {
                        info!(refined = %query, "reasoner requested another round");
                        iteration += 1;
                        current_query = Arc::new(self.analyzer.analyze(&query, now));
                        continue;
                    }
                    Err(error) => {
                        warn!(code = error.code(), %error, "escalation failed");
                        warnings.push(format!(
                            "reasoner escalation failed: {} ({})",
                            error,
                            error.code()
                        ));
                    }
                }
            }

            // No refinement left, no escalation possible: emit the best we have.
            self.transition(&mut phase, SearchPhase::Done, iteration);
            return self.finish(question, best, warnings, iteration + 1, false, AnswerSource::Search);
        }
    }

    fn transition(&self, phase: &mut SearchPhase, next: SearchPhase, iteration: usize) {
        info!(iteration, from = %phase, to = %next, "loop transition");
        *phase = next;
    }

    /// Build one refinement variant from the shared context: the original
    /// question plus a few discovered terms the query does not already have,
    /// plus a discovered date when the query had none. Returns `None` when
    /// the context has nothing new to offer.
    fn refine_query(
        &self,
        question: &str,
        current: &AnalyzedQuery,
        ctx: &SharedContext,
        now: DateTime<Utc>,
    ) -> Option<AnalyzedQuery> {
        let snapshot = ctx.snapshot();
        let own: BTreeSet<&String> = current.terms.iter().collect();
        let extra: Vec<&String> = snapshot
            .discovered_terms
            .iter()
            .filter(|t| !own.contains(*t))
            .take(REFINEMENT_TERMS)
            .collect();

        let mut raw = question.to_string();
        for term in &extra {
            raw.push(' ');
            raw.push_str(term);
        }
        if current.temporal.is_empty() {
            if let Some(date) = snapshot.discovered_dates.iter().next_back() {
                raw.push(' ');
                raw.push_str(&date.to_string());
            }
        }

        let variant = self.analyzer.analyze(&raw, now);
        (variant.terms != current.terms || variant.temporal != current.temporal).then_some(variant)
    }

    fn escalation_prompt(question: &str, iteration: usize, evidence: &[SearchResult]) -> String {
        let mut prompt = format!(
            "Question: {question}\nLocal search rounds: {}\nTop evidence:\n",
            iteration + 1
        );
        for result in evidence {
            prompt.push_str(&format!(
                "- {} (score {:.2}, strategies {})\n",
                result.recording_id,
                result.score,
                result
                    .matching_strategies
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join("+")
            ));
        }
        prompt
    }

    fn finish(
        &self,
        question: &str,
        best: Option<(Vec<ConsensusResult>, f32)>,
        warnings: Vec<String>,
        rounds: usize,
        cancelled: bool,
        source: AnswerSource,
    ) -> LoopOutcome {
        let (ranked, confidence) = best.unwrap_or((Vec::new(), 0.0));
        let results = Self::results_of(ranked);
        let citations: Vec<String> = results
            .iter()
            .take(MAX_CITATIONS)
            .map(|r| r.recording_id.clone())
            .collect();
        let answer_text = if citations.is_empty() {
            format!("No recordings matched \"{question}\".")
        } else {
            format!(
                "Top recordings for \"{question}\": {}.",
                citations.join(", ")
            )
        };
        LoopOutcome {
            answer: EngineAnswer {
                answer_text,
                confidence,
                citations,
                source,
                rounds,
                warnings,
                cancelled,
            },
            results,
        }
    }

    fn results_of(ranked: Vec<ConsensusResult>) -> Vec<SearchResult> {
        ranked.into_iter().map(|r| r.result).collect()
    }

    fn persist_record(dir: Option<&std::path::Path>, record: &IterationRecord) {
        let Some(dir) = dir else { return };
        let path = dir.join(format!("iteration-{:03}.json", record.iteration));
        match serde_json::to_vec_pretty(record) {
            Ok(bytes) => {
                if let Err(error) = std::fs::write(&path, bytes) {
                    warn!(%error, path = %path.display(), "could not persist iteration record");
                }
            }
            Err(error) => warn!(%error, "could not serialise iteration record"),
        }
    }

    fn persist_prompt(dir: Option<&std::path::Path>, escalation: usize, prompt: &str) {
        let Some(dir) = dir else { return };
        let path = dir.join(format!("escalation-{escalation:02}.txt"));
        if let Err(error) = std::fs::write(&path, prompt) {
            warn!(%error, path = %path.display(), "could not persist escalation prompt");
        }
    }
}
