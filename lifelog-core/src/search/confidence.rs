//! Local confidence assessment
//!
//! Scores how trustworthy a round of consensus results looks without asking
//! any external model: top consensus score, strategy agreement, and the
//! shape of the top-k. The gate below makes the contract explicit: the
//! assessment can only exceed the high-confidence band when the top result
//! was found by at least two strategies with a solid average score.

use crate::search::consensus::ConsensusResult;

/// Weight of the top result's consensus score.
const TOP_SCORE_WEIGHT: f32 = 0.5;
/// Weight of the strategy-agreement factor.
const AGREEMENT_WEIGHT: f32 = 0.3;
/// Weight of the mean over the top results.
const TOP_K_WEIGHT: f32 = 0.2;
/// How many results the top-k mean looks at.
const TOP_K: usize = 3;
/// Ceiling applied when the top result lacks multi-strategy agreement with a
/// decent average score.
const SINGLE_STRATEGY_CEILING: f32 = 0.75;
/// Average strategy score the top result needs for the ceiling to lift.
const AGREEMENT_AVG_FLOOR: f32 = 0.6;

/// Assess local confidence for one round, in [0, 1].
///
/// Zero for an empty round. The result exceeds the early-return band only
/// when the top hit was found by two or more strategies averaging at least
/// `AGREEMENT_AVG_FLOOR`.
#[must_use]
pub fn local_confidence(ranked: &[ConsensusResult]) -> f32 {
    let Some(top) = ranked.first() else {
        return 0.0;
    };

    let distinct = top.result.matching_strategies.len();
    let agreement = match distinct {
        0 | 1 => 0.0,
        2 => 0.5,
        _ => 1.0,
    };

    let top_k = &ranked[..ranked.len().min(TOP_K)];
    let top_k_mean = top_k.iter().map(|r| r.result.score).sum::<f32>() / top_k.len() as f32;

    let raw = TOP_SCORE_WEIGHT * top.result.score
        + AGREEMENT_WEIGHT * agreement
        + TOP_K_WEIGHT * top_k_mean;

    if distinct >= 2 && top.avg_score >= AGREEMENT_AVG_FLOOR {
        raw.clamp(0.0, 1.0)
    } else {
        raw.min(SINGLE_STRATEGY_CEILING)
    }
}
