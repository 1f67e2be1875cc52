//! End-to-end search scenarios: exact-phrase retrieval, temporal narrowing,
//! dimension-fix compatibility, escalation, and cache behaviour.

use e2e_tests::{instant, Harness};
use lifelog_core::capabilities::ReasonerVerdict;
use lifelog_core::config::EngineConfig;
use lifelog_core::store::CorpusStore;
use lifelog_core::types::{AnswerSource, StrategyKind};
use lifelog_core::CancelToken;
use std::sync::Arc;
use test_utils::{date, recording_on, MockReasoner};

#[tokio::test]
async fn exact_phrase_retrieval_ranks_the_recording_in_top_three() {
    let harness = Harness::new();
    harness
        .seed(&[
            recording_on(
                "rec-mimi",
                date(2025, 6, 5),
                "Afternoon",
                "Mom (12:25 PM): heading out now\nMom (12:30 PM): kids went to Mimi's house at 12:30",
            ),
            recording_on(
                "rec-standup",
                date(2025, 6, 4),
                "Standup",
                "Ana (09:00 AM): sprint review went fine yesterday",
            ),
            recording_on(
                "rec-budget",
                date(2025, 6, 3),
                "Budget",
                "Finance (14:00 PM): the quarterly numbers look stable",
            ),
        ])
        .await;

    let response = harness
        .engine
        .search_once(
            "where did the kids go this afternoon?",
            instant(2025, 6, 5, 18, 0),
            10,
            &CancelToken::new(),
        )
        .await;

    let top3: Vec<&str> = response
        .results
        .iter()
        .take(3)
        .map(|r| r.recording_id.as_str())
        .collect();
    assert!(top3.contains(&"rec-mimi"), "expected rec-mimi in top 3, got {top3:?}");

    let mimi = response
        .results
        .iter()
        .find(|r| r.recording_id == "rec-mimi")
        .unwrap();
    assert!(
        mimi.matching_strategies.contains(&StrategyKind::Lexical),
        "lexical strategy must have found it, got {:?}",
        mimi.matching_strategies
    );
}

#[tokio::test]
async fn temporal_narrowing_prefers_yesterdays_recording() {
    let harness = Harness::new();
    harness
        .seed(&[
            recording_on(
                "rec-0310",
                date(2024, 3, 10),
                "Finance sync",
                "Ana (10:00 AM): the budget review went well",
            ),
            recording_on(
                "rec-0311",
                date(2024, 3, 11),
                "Finance sync",
                "Ana (10:00 AM): the budget review went well",
            ),
        ])
        .await;

    let response = harness
        .engine
        .search_once("budget yesterday", instant(2024, 3, 11, 12, 0), 10, &CancelToken::new())
        .await;

    assert_eq!(
        response.results[0].recording_id, "rec-0310",
        "yesterday's recording must rank first"
    );
}

#[tokio::test]
async fn dimension_fix_pads_and_flags_when_the_encoder_shrinks() {
    // Corpus declared at 768, encoder swapped to a 384-dimension model.
    let config = EngineConfig {
        corpus_dimension: 768,
        ..EngineConfig::default()
    };
    let harness = Harness::with_config(config, 384);
    harness
        .seed(&[recording_on(
            "rec-budget",
            date(2025, 6, 3),
            "Budget",
            "Finance (14:00 PM): the quarterly budget forecast",
        )])
        .await;

    let (metadata, _lexical_generation) = harness.engine.index_metadata();
    assert_eq!(metadata.dimension, 768);
    assert!(metadata.dimension_padded, "the adaptation must be observable");

    // Queries still answer with the padded vectors.
    let response = harness
        .engine
        .search_once("budget forecast", instant(2025, 6, 10, 12, 0), 10, &CancelToken::new())
        .await;
    assert_eq!(response.results[0].recording_id, "rec-budget");

    // Stored sidecars carry corpus-dimension vectors exactly.
    let embeddings = harness
        .corpus
        .store
        .get_embeddings("rec-budget", date(2025, 6, 3))
        .await
        .unwrap()
        .unwrap();
    assert!(embeddings.iter().all(|e| e.vector.len() == 768));
}

#[tokio::test]
async fn escalation_calls_the_reasoner_once_and_uses_its_refinement() {
    let config = EngineConfig {
        early_return_threshold: 1.1, // force the full loop
        escalation_threshold: 1.0,   // always escalate when local search is done
        max_refinements: 0,
        max_escalations: 1,
        ..EngineConfig::default()
    };
    let harness = Harness::with_config(config, EngineConfig::default().corpus_dimension);
    harness
        .seed(&[
            recording_on(
                "rec-budget",
                date(2024, 3, 10),
                "Budget meeting",
                "Ana (10:00 AM): budget meeting notes on the forecast",
            ),
            recording_on(
                "rec-picnic",
                date(2024, 3, 11),
                "Picnic",
                "Carol (12:00 PM): the park picnic with the kids",
            ),
        ])
        .await;

    let reasoner = Arc::new(MockReasoner::new(vec![ReasonerVerdict::Refine {
        query: "budget meeting notes".to_string(),
    }]));
    let engine = harness.engine.with_reasoner(Arc::clone(&reasoner) as _);

    let answer = engine
        .answer(
            "that meeting thing, maybe important",
            instant(2024, 3, 12, 9, 0),
            10,
            &CancelToken::new(),
        )
        .await;

    assert_eq!(reasoner.call_count(), 1, "reasoner consulted exactly once");
    let evidence_sizes = reasoner.evidence_sizes();
    assert!(evidence_sizes[0] <= 10, "evidence is the top-10 consensus");
    assert!(
        answer.citations.contains(&"rec-budget".to_string()),
        "final answer must cite a recording from the refined round, got {:?}",
        answer.citations
    );
}

#[tokio::test]
async fn cache_hit_skips_the_executor_on_the_second_identical_query() {
    let harness = Harness::new();
    harness
        .seed(&[
            recording_on(
                "rec-budget",
                date(2024, 3, 10),
                "Budget forecast",
                "Ana (10:00 AM): budget forecast review with finance\nBob (10:05 AM): forecast approved",
            ),
            recording_on(
                "rec-picnic",
                date(2024, 3, 11),
                "Picnic",
                "Carol (12:00 PM): park afternoon with the kids",
            ),
        ])
        .await;

    let now = instant(2024, 3, 12, 9, 0);
    let first = harness
        .engine
        .answer("budget forecast review", now, 10, &CancelToken::new())
        .await;
    assert_eq!(first.source, AnswerSource::Search);
    assert!(
        first.confidence >= 0.7,
        "scenario needs a cacheable first answer, got {}",
        first.confidence
    );

    let second = harness
        .engine
        .answer("budget forecast review", now, 10, &CancelToken::new())
        .await;
    assert_eq!(second.source, AnswerSource::Cache, "second call must be served from cache");
    assert_eq!(second.rounds, 0, "the executor must not run on a cache hit");
    assert_eq!(second.answer_text, first.answer_text);

    // Normalisation makes trivially different spellings hit too.
    let third = harness
        .engine
        .answer("Budget   forecast review?", now, 10, &CancelToken::new())
        .await;
    assert_eq!(third.source, AnswerSource::Cache);
}

#[tokio::test]
async fn identical_queries_are_deterministic_at_the_same_generation() {
    let harness = Harness::new();
    harness
        .seed(&[
            recording_on("rec-a", date(2024, 3, 10), "Notes", "budget planning for the quarter"),
            recording_on("rec-b", date(2024, 3, 11), "Notes", "budget review and planning"),
            recording_on("rec-c", date(2024, 3, 12), "Notes", "unrelated picnic chatter"),
        ])
        .await;

    let now = instant(2024, 3, 13, 9, 0);
    let first = harness
        .engine
        .search_once("budget planning", now, 10, &CancelToken::new())
        .await;
    let second = harness
        .engine
        .search_once("budget planning", now, 10, &CancelToken::new())
        .await;
    let ids = |r: &lifelog_core::SearchResponse| -> Vec<String> {
        r.results.iter().map(|x| x.recording_id.clone()).collect()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn cancelled_query_returns_partial_flagged_answer() {
    let harness = Harness::new();
    harness
        .seed(&[recording_on("rec-a", date(2024, 3, 10), "Notes", "budget planning")])
        .await;
    let cancel = CancelToken::new();
    cancel.cancel();
    let answer = harness
        .engine
        .answer("budget", instant(2024, 3, 11, 9, 0), 10, &cancel)
        .await;
    assert!(answer.cancelled);
}
