//! Consensus ranking across strategies
//!
//! Merges per-strategy results on recording id and recomputes one score per
//! recording from the agreement structure: average and maximum strategy
//! score, a fixed-weight strategy contribution biased toward lexical (the
//! counterweight to semantic drift), a multi-strategy bonus, and a penalty
//! when no lexical-class strategy found the recording.

use crate::constants::defaults;
use crate::search::executor::ExecutorRound;
use crate::types::{
    result_ordering, HighlightSpan, SearchResponse, SearchResult, StrategyKind,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

/// Weight class a strategy contributes through. Hybrid carries the vector
/// class so agreement between vector and hybrid is not double-counted.
fn weight_class(kind: StrategyKind) -> StrategyKind {
    match kind {
        StrategyKind::Hybrid => StrategyKind::Vector,
        other => other,
    }
}

/// A merged result with the intermediate signals the confidence assessment
/// needs.
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    /// The merged, rescored result
    pub result: SearchResult,
    /// Mean of the per-strategy scores
    pub avg_score: f32,
    /// Best per-strategy score
    pub max_score: f32,
}

#[derive(Debug)]
struct Accumulator {
    scores: Vec<f32>,
    strategies: BTreeSet<StrategyKind>,
    /// Best score per weight class
    class_best: HashMap<StrategyKind, f32>,
    spans: Vec<HighlightSpan>,
    chunk_ref: Option<crate::types::ChunkRef>,
    start_time: DateTime<Utc>,
}

/// Merge a fan-out round into consensus-ranked results.
///
/// Output is bounded by `max_results` and deterministically ordered
/// (consensus desc, newer start, id).
#[must_use]
pub fn merge(round: &ExecutorRound, max_results: usize) -> Vec<ConsensusResult> {
    let mut merged: HashMap<String, Accumulator> = HashMap::new();

    for (kind, results) in &round.per_strategy {
        for result in results {
            let acc = merged
                .entry(result.recording_id.clone())
                .or_insert_with(|| Accumulator {
                    scores: Vec::new(),
                    strategies: BTreeSet::new(),
                    class_best: HashMap::new(),
                    spans: Vec::new(),
                    chunk_ref: None,
                    start_time: result.start_time,
                });
            acc.scores.push(result.score);
            acc.strategies.insert(*kind);
            let class = weight_class(*kind);
            let best = acc.class_best.entry(class).or_insert(0.0);
            if result.score > *best {
                *best = result.score;
            }
            acc.spans.extend(result.highlight_spans.iter().copied());
            if acc.chunk_ref.is_none() {
                acc.chunk_ref = result.chunk_ref;
            }
        }
    }

    let mut ranked: Vec<ConsensusResult> = merged
        .into_iter()
        .map(|(id, mut acc)| {
            let avg = acc.scores.iter().sum::<f32>() / acc.scores.len() as f32;
            let max = acc.scores.iter().fold(0.0f32, |m, &s| m.max(s));
            let weighted: f32 = acc
                .class_best
                .iter()
                .map(|(class, score)| class.consensus_weight() * score)
                .sum();

            let distinct = acc.strategies.len();
            let bonus = if distinct >= 3 {
                defaults::MULTI_STRATEGY_BONUS_3
            } else if distinct >= 2 {
                defaults::MULTI_STRATEGY_BONUS_2
            } else {
                0.0
            };
            let penalty = if acc.class_best.contains_key(&StrategyKind::Lexical) {
                0.0
            } else {
                defaults::NO_LEXICAL_PENALTY
            };

            let consensus = (defaults::CONSENSUS_AVG_WEIGHT * avg
                + defaults::CONSENSUS_MAX_WEIGHT * max
                + defaults::CONSENSUS_STRATEGY_WEIGHT * weighted
                + bonus
                - penalty)
                .clamp(0.0, 1.0);

            acc.spans.sort_unstable();
            acc.spans.dedup();

            let mut result =
                SearchResult::new(id, consensus, StrategyKind::Lexical, acc.start_time)
                    .with_spans(acc.spans);
            result.matching_strategies = acc.strategies;
            result.chunk_ref = acc.chunk_ref;
            ConsensusResult {
                result,
                avg_score: avg,
                max_score: max,
            }
        })
        .collect();

    ranked.sort_by(|a, b| result_ordering(&a.result, &b.result));
    ranked.truncate(max_results);
    ranked
}

/// Assemble the user-facing response for a round.
#[must_use]
pub fn to_response(round: &ExecutorRound, ranked: Vec<ConsensusResult>) -> SearchResponse {
    SearchResponse {
        results: ranked.into_iter().map(|r| r.result).collect(),
        failed_strategies: round.failed.clone(),
        degraded: round.degraded(),
        cancelled: round.cancelled,
        warnings: round.warnings.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap()
    }

    fn round_with(per_strategy: Vec<(StrategyKind, Vec<SearchResult>)>) -> ExecutorRound {
        ExecutorRound {
            per_strategy,
            ..ExecutorRound::default()
        }
    }

    fn hit(id: &str, score: f32, kind: StrategyKind) -> SearchResult {
        SearchResult::new(id, score, kind, start(10))
    }

    #[test]
    fn multi_strategy_bonus_is_monotone() {
        let single = round_with(vec![(
            StrategyKind::Lexical,
            vec![hit("rec-a", 0.7, StrategyKind::Lexical)],
        )]);
        let double = round_with(vec![
            (StrategyKind::Lexical, vec![hit("rec-a", 0.7, StrategyKind::Lexical)]),
            (StrategyKind::Vector, vec![hit("rec-a", 0.7, StrategyKind::Vector)]),
        ]);
        let triple = round_with(vec![
            (StrategyKind::Lexical, vec![hit("rec-a", 0.7, StrategyKind::Lexical)]),
            (StrategyKind::Vector, vec![hit("rec-a", 0.7, StrategyKind::Vector)]),
            (StrategyKind::Temporal, vec![hit("rec-a", 0.7, StrategyKind::Temporal)]),
        ]);
        let score = |round: &ExecutorRound| merge(round, 10)[0].result.score;
        assert!(score(&double) > score(&single));
        assert!(score(&triple) > score(&double));
    }

    #[test]
    fn no_lexical_match_is_penalised() {
        let with_lexical = round_with(vec![(
            StrategyKind::Lexical,
            vec![hit("rec-a", 0.7, StrategyKind::Lexical)],
        )]);
        let vector_only = round_with(vec![(
            StrategyKind::Vector,
            vec![hit("rec-a", 0.7, StrategyKind::Vector)],
        )]);
        assert!(merge(&with_lexical, 10)[0].result.score > merge(&vector_only, 10)[0].result.score);
    }

    #[test]
    fn score_never_exceeds_one() {
        let round = round_with(vec![
            (StrategyKind::Lexical, vec![hit("rec-a", 1.0, StrategyKind::Lexical)]),
            (StrategyKind::Vector, vec![hit("rec-a", 1.0, StrategyKind::Vector)]),
            (StrategyKind::Hybrid, vec![hit("rec-a", 1.0, StrategyKind::Hybrid)]),
            (StrategyKind::Temporal, vec![hit("rec-a", 1.0, StrategyKind::Temporal)]),
        ]);
        let ranked = merge(&round, 10);
        assert!(ranked[0].result.score <= 1.0);
        assert_eq!(ranked[0].result.matching_strategies.len(), 4);
    }

    #[test]
    fn spans_are_merged_and_deduped() {
        let span = HighlightSpan { offset: 4, len: 6 };
        let other = HighlightSpan { offset: 20, len: 3 };
        let round = round_with(vec![
            (
                StrategyKind::Lexical,
                vec![hit("rec-a", 0.7, StrategyKind::Lexical).with_spans(vec![span, other])],
            ),
            (
                StrategyKind::Hybrid,
                vec![hit("rec-a", 0.6, StrategyKind::Hybrid).with_spans(vec![span])],
            ),
        ]);
        let ranked = merge(&round, 10);
        assert_eq!(ranked[0].result.highlight_spans, vec![span, other]);
    }

    #[test]
    fn output_is_caller_bounded_and_ordered() {
        let round = round_with(vec![(
            StrategyKind::Lexical,
            vec![
                hit("rec-a", 0.5, StrategyKind::Lexical),
                hit("rec-b", 0.9, StrategyKind::Lexical),
                hit("rec-c", 0.7, StrategyKind::Lexical),
            ],
        )]);
        let ranked = merge(&round, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].result.recording_id, "rec-b");
        assert_eq!(ranked[1].result.recording_id, "rec-c");
    }

    #[test]
    fn avg_and_max_are_exposed_for_confidence() {
        let round = round_with(vec![
            (StrategyKind::Lexical, vec![hit("rec-a", 0.8, StrategyKind::Lexical)]),
            (StrategyKind::Vector, vec![hit("rec-a", 0.4, StrategyKind::Vector)]),
        ]);
        let ranked = merge(&round, 10);
        assert!((ranked[0].avg_score - 0.6).abs() < 1e-6);
        assert!((ranked[0].max_score - 0.8).abs() < 1e-6);
    }
}
