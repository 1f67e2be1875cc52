//! Shared harness for the end-to-end scenarios
//!
//! Builds a full engine over a temp-dir corpus with the deterministic mock
//! encoder, a scripted recording source, and the real filesystem backend.

use chrono::{DateTime, Utc};
use lifelog_core::cache::AnswerCache;
use lifelog_core::capabilities::{Encoder, MockEncoder};
use lifelog_core::config::EngineConfig;
use lifelog_core::engine::SearchEngine;
use lifelog_core::store::chunker::{chunk_recording, ChunkerConfig};
use lifelog_core::store::CorpusStore;
use lifelog_core::sync::SyncService;
use lifelog_core::types::Recording;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{MockRecordingSource, TempCorpus};

/// A fully wired engine + sync stack over a temporary corpus.
pub struct Harness {
    pub corpus: TempCorpus,
    pub source: Arc<MockRecordingSource>,
    pub encoder: Arc<dyn Encoder>,
    pub engine: SearchEngine,
    pub config: EngineConfig,
}

impl Harness {
    /// Build a harness with the given config and encoder dimension.
    pub fn with_config(mut config: EngineConfig, encoder_dimension: usize) -> Self {
        // Tests never want the production rate-limit pauses.
        config.source_call_delay = Duration::ZERO;
        config.poll_interval = Duration::from_millis(1);

        let corpus = TempCorpus::new();
        let source = Arc::new(MockRecordingSource::new());
        let encoder: Arc<dyn Encoder> = Arc::new(MockEncoder::new(encoder_dimension));
        let store: Arc<dyn CorpusStore> = Arc::clone(&corpus.store) as _;
        let cache = Arc::new(
            AnswerCache::new(config.answer_cache_capacity, config.cache_threshold)
                .with_store(Arc::clone(&corpus.answers) as _),
        );
        let engine = SearchEngine::new(config.clone(), store, Arc::clone(&encoder))
            .with_answer_cache(cache)
            .with_session_root(corpus.dir.path().join("sessions"));
        Self {
            corpus,
            source,
            encoder,
            engine,
            config,
        }
    }

    /// Default config, encoder dimension matching the corpus dimension.
    pub fn new() -> Self {
        let config = EngineConfig::default();
        let dimension = config.corpus_dimension;
        Self::with_config(config, dimension)
    }

    /// The sync service wired to this harness's stores and indexes.
    pub fn sync(&self) -> SyncService {
        SyncService::new(
            Arc::clone(&self.source) as _,
            Arc::clone(&self.corpus.store) as _,
            self.engine.lexical_index(),
            self.engine.vector_index(),
            Arc::clone(&self.encoder),
            Arc::clone(&self.corpus.checkpoints) as _,
            self.engine.config(),
        )
        .with_answer_cache(self.engine.answer_cache())
    }

    /// Feed recordings straight into the store and both indexes, bypassing
    /// the sync pipeline. For scenarios that are about querying, not ingest.
    pub async fn seed(&self, recordings: &[Recording]) {
        let chunker = ChunkerConfig::default();
        for recording in recordings {
            self.corpus
                .store
                .put(recording)
                .await
                .expect("seed recording persists");
            let chunks = chunk_recording(recording, &chunker);
            let embeddings = self
                .engine
                .vector_index()
                .upsert(recording, &chunks, self.encoder.as_ref())
                .await
                .expect("seed recording embeds");
            self.corpus
                .store
                .put_embeddings(&recording.id, recording.date(), &embeddings)
                .await
                .expect("seed embeddings persist");
        }
        self.engine.lexical_index().add_batch(recordings);
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Instant helper for scenario clocks.
pub fn instant(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}
