//! End-to-end sync scenarios: the two-phase pipeline, checkpointed resume,
//! retry/error-log behaviour, monitoring, and cache invalidation.

use async_trait::async_trait;
use chrono::NaiveDate;
use e2e_tests::{instant, Harness};
use lifelog_core::capabilities::{RawRecording, RecordingSource};
use lifelog_core::config::EngineConfig;
use lifelog_core::error::Result;
use lifelog_core::store::CorpusStore;
use lifelog_core::sync::{CheckpointStore, SyncCheckpoint, SyncPhase};
use lifelog_core::CancelToken;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use test_utils::{date, raw_recording_on, MockRecordingSource};

use futures::StreamExt;

/// Pass-through source that fires a cancel token at the start of the Nth
/// `list_by_date` call (serving that call empty), simulating an operator
/// interrupt between batches.
struct CancelAtCall {
    inner: Arc<MockRecordingSource>,
    token: CancelToken,
    cancel_at: u32,
    calls: AtomicU32,
}

#[async_trait]
impl RecordingSource for CancelAtCall {
    async fn list_by_date(&self, day: NaiveDate) -> Result<Vec<RawRecording>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_at {
            self.token.cancel();
            return Ok(Vec::new());
        }
        self.inner.list_by_date(day).await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RawRecording>> {
        self.inner.list_recent(limit).await
    }
}

fn script_seven_days(source: &MockRecordingSource) -> Vec<NaiveDate> {
    let days: Vec<NaiveDate> = (1..=7).map(|d| date(2024, 3, d)).collect();
    for (i, day) in days.iter().enumerate() {
        source.add_day(
            *day,
            vec![raw_recording_on(
                &format!("rec-{i}"),
                *day,
                "Daily notes",
                "Ana (09:00 AM): some notes for the day",
            )],
        );
    }
    days
}

#[tokio::test]
async fn download_then_index_then_monitor() {
    let harness = Harness::new();
    script_seven_days(&harness.source);
    let sync = harness.sync();

    let checkpoint = sync
        .download_range(
            SyncCheckpoint {
                phase: SyncPhase::Downloading,
                ..SyncCheckpoint::default()
            },
            date(2024, 3, 7),
            date(2024, 3, 1),
            &CancelToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(checkpoint.phase, SyncPhase::Indexing);
    assert_eq!(harness.corpus.store.stats().await.unwrap().count, 7);

    let checkpoint = sync
        .indexing_phase(checkpoint, instant(2024, 3, 7, 23, 0), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(checkpoint.phase, SyncPhase::Monitoring);
    let (metadata, lexical_generation) = harness.engine.index_metadata();
    assert_eq!(metadata.recordings, 7);
    assert!(lexical_generation > 0);

    // A new recording appears upstream; one monitoring poll ingests it.
    harness.source.add_day(
        date(2024, 3, 8),
        vec![raw_recording_on(
            "rec-new",
            date(2024, 3, 8),
            "Fresh",
            "Ana (09:00 AM): brand new recording",
        )],
    );
    let checkpoint = sync.monitor_once(checkpoint).await.unwrap();
    assert_eq!(harness.corpus.store.stats().await.unwrap().count, 8);
    assert!(checkpoint.last_processed_timestamp.is_some());

    // Polling again without new data changes nothing.
    let checkpoint = sync.monitor_once(checkpoint).await.unwrap();
    assert_eq!(harness.corpus.store.stats().await.unwrap().count, 8);
    assert!(checkpoint.errors.is_empty());
}

#[tokio::test]
async fn interrupted_download_resumes_without_duplicates() {
    let config = EngineConfig {
        sync_batch_days: 1,
        ..EngineConfig::default()
    };
    let harness = Harness::with_config(config, EngineConfig::default().corpus_dimension);
    let scripted = Arc::new(MockRecordingSource::new());
    script_seven_days(&scripted);

    // First attempt: interrupted at the fourth day, i.e. after 3 completed
    // single-day batches.
    let token = CancelToken::new();
    let interrupting = Arc::new(CancelAtCall {
        inner: Arc::clone(&scripted),
        token: token.clone(),
        cancel_at: 4,
        calls: AtomicU32::new(0),
    });
    let sync = lifelog_core::sync::SyncService::new(
        interrupting,
        Arc::clone(&harness.corpus.store) as _,
        harness.engine.lexical_index(),
        harness.engine.vector_index(),
        Arc::clone(&harness.encoder),
        Arc::clone(&harness.corpus.checkpoints) as _,
        harness.engine.config(),
    );
    let checkpoint = sync
        .download_range(
            SyncCheckpoint {
                phase: SyncPhase::Downloading,
                ..SyncCheckpoint::default()
            },
            date(2024, 3, 7),
            date(2024, 3, 1),
            &token,
        )
        .await
        .unwrap();
    assert_eq!(checkpoint.phase, SyncPhase::Downloading, "still mid-phase");
    assert_eq!(checkpoint.processed_batches.len(), 3, "three batches survived the interrupt");
    assert_eq!(harness.corpus.store.stats().await.unwrap().count, 3);

    // Second attempt resumes from the persisted checkpoint and completes.
    let sync = lifelog_core::sync::SyncService::new(
        scripted,
        Arc::clone(&harness.corpus.store) as _,
        harness.engine.lexical_index(),
        harness.engine.vector_index(),
        Arc::clone(&harness.encoder),
        Arc::clone(&harness.corpus.checkpoints) as _,
        harness.engine.config(),
    );
    let resumed = harness
        .corpus
        .checkpoints
        .load()
        .await
        .unwrap()
        .expect("checkpoint persisted across the interrupt");
    let finished = sync
        .download_range(resumed, date(2024, 3, 7), date(2024, 3, 1), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(finished.phase, SyncPhase::Indexing);
    assert_eq!(finished.processed_batches.len(), 7, "exactly 7 distinct batches");

    // The union across both attempts equals one uninterrupted run: 7
    // recordings, each id exactly once.
    let stats = harness.corpus.store.stats().await.unwrap();
    assert_eq!(stats.count, 7);
    let mut ids: Vec<String> = harness
        .corpus
        .store
        .list_by_range(date(2024, 3, 1), date(2024, 3, 7))
        .map(|e| e.unwrap().0)
        .collect()
        .await;
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 7, "no duplicate writes");
}

#[tokio::test(start_paused = true)]
async fn failed_day_is_logged_and_the_phase_continues() {
    let harness = Harness::new();
    let bad_day = date(2024, 3, 2);
    harness.source.add_day(
        date(2024, 3, 1),
        vec![raw_recording_on("rec-ok", date(2024, 3, 1), "Fine", "Ana (09:00 AM): fine")],
    );
    harness.source.add_day(
        bad_day,
        vec![raw_recording_on("rec-bad", bad_day, "Broken", "Ana (09:00 AM): broken")],
    );
    // More failures than the retry budget allows.
    harness.source.fail_date(bad_day, 10);

    let sync = harness.sync();
    let checkpoint = sync
        .download_range(
            SyncCheckpoint {
                phase: SyncPhase::Downloading,
                ..SyncCheckpoint::default()
            },
            date(2024, 3, 2),
            date(2024, 3, 1),
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(checkpoint.phase, SyncPhase::Indexing, "the phase never aborts");
    assert!(checkpoint.errors.iter().any(|e| e.date == bad_day));
    // The good day made it in despite the bad one.
    assert!(harness.corpus.store.exists("rec-ok", date(2024, 3, 1)).await.unwrap());
    assert!(!harness.corpus.store.exists("rec-bad", bad_day).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_to_success() {
    let harness = Harness::new();
    let flaky_day = date(2024, 3, 1);
    harness.source.add_day(
        flaky_day,
        vec![raw_recording_on("rec-flaky", flaky_day, "Flaky", "Ana (09:00 AM): made it")],
    );
    harness.source.fail_date(flaky_day, 2); // fails twice, succeeds third

    let sync = harness.sync();
    let checkpoint = sync
        .download_range(
            SyncCheckpoint {
                phase: SyncPhase::Downloading,
                ..SyncCheckpoint::default()
            },
            flaky_day,
            flaky_day,
            &CancelToken::new(),
        )
        .await
        .unwrap();

    assert!(checkpoint.errors.is_empty());
    assert!(harness.corpus.store.exists("rec-flaky", flaky_day).await.unwrap());
}

#[tokio::test]
async fn clear_all_is_refused_outside_idle() {
    let harness = Harness::new();
    let sync = harness.sync();

    // Pretend a download is underway.
    harness
        .corpus
        .checkpoints
        .save(&SyncCheckpoint {
            phase: SyncPhase::Downloading,
            ..SyncCheckpoint::default()
        })
        .await
        .unwrap();
    let err = sync.clear_all().await.unwrap_err();
    assert_eq!(err.code(), "E_INVALID_STATE");

    // Back to idle (checkpoint cleared), clearing is honoured.
    harness.corpus.checkpoints.clear().await.unwrap();
    sync.clear_all().await.unwrap();
    assert_eq!(harness.corpus.store.stats().await.unwrap().count, 0);
}

#[tokio::test]
async fn divergent_reingest_evicts_citing_answers() {
    let harness = Harness::new();

    // Original recording and a cached answer citing it.
    let day = date(2024, 3, 10);
    let original = test_utils::recording_on("rec-cited", day, "Budget", "Ana (09:00 AM): v1 text");
    harness.corpus.store.put(&original).await.unwrap();
    let cache = harness.engine.answer_cache();
    cache
        .put(
            "what was the budget",
            &lifelog_core::EngineAnswer {
                answer_text: "v1 of the budget".to_string(),
                confidence: 0.9,
                citations: vec!["rec-cited".to_string()],
                source: lifelog_core::AnswerSource::Search,
                rounds: 1,
                warnings: Vec::new(),
                cancelled: false,
            },
        )
        .await;
    assert!(cache.get("what was the budget").await.is_some());

    // Upstream serves the same id with changed content.
    harness.source.add_day(
        day,
        vec![raw_recording_on("rec-cited", day, "Budget", "Ana (09:00 AM): v2 rewritten text")],
    );
    let sync = harness.sync();
    let checkpoint = sync
        .monitor_once(SyncCheckpoint {
            phase: SyncPhase::Monitoring,
            last_processed_timestamp: Some(instant(2024, 3, 9, 0, 0)),
            ..SyncCheckpoint::default()
        })
        .await
        .unwrap();

    // The store refused the divergent write, the violation is logged, and
    // the stale answer is gone.
    assert!(checkpoint.errors.iter().any(|e| e.code == "E_DUPLICATE_ID"));
    assert!(cache.get("what was the budget").await.is_none());
    let kept = harness.corpus.store.get("rec-cited", day).await.unwrap().unwrap();
    assert_eq!(kept.text, "Ana (09:00 AM): v1 text");
}
