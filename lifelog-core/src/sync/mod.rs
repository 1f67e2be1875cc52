//! Incremental sync pipeline
//!
//! A two-phase, resumable state machine over the rate-limited recording
//! source: `Idle -> Downloading -> Indexing -> Monitoring`. The source's
//! range queries are known to truncate, so the download phase only ever
//! issues single-day queries, walking backwards from today in checkpointed
//! batches. The indexing phase never touches the source. Monitoring polls
//! for new recordings and ingests them through the same idempotent path.
//!
//! Crash safety comes from two properties: the checkpoint is persisted on
//! every batch boundary, and the corpus store's content-hash check makes
//! every `put` idempotent. Resuming after an interrupt therefore loses
//! nothing and writes nothing twice.

mod checkpoint;

pub use checkpoint::{CheckpointStore, SyncCheckpoint, SyncErrorEntry, SyncPhase};

use crate::cancel::CancelToken;
use crate::capabilities::{Encoder, RawRecording, RecordingSource};
use crate::cache::AnswerCache;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::index::{LexicalIndex, VectorIndex};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::store::chunker::{chunk_recording, ChunkerConfig};
use crate::store::format::extract_headings;
use crate::store::{CorpusStore, PutOutcome};
use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Recordings requested per monitoring poll.
const MONITOR_FETCH_LIMIT: usize = 50;

/// The incremental sync service. Single writer to the corpus store.
pub struct SyncService {
    source: Arc<dyn RecordingSource>,
    store: Arc<dyn CorpusStore>,
    lexical: Arc<LexicalIndex>,
    vector: Arc<VectorIndex>,
    encoder: Arc<dyn Encoder>,
    checkpoints: Arc<dyn CheckpointStore>,
    cache: Option<Arc<AnswerCache>>,
    config: Arc<EngineConfig>,
    retry: RetryPolicy,
}

impl SyncService {
    /// Wire up the pipeline.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn RecordingSource>,
        store: Arc<dyn CorpusStore>,
        lexical: Arc<LexicalIndex>,
        vector: Arc<VectorIndex>,
        encoder: Arc<dyn Encoder>,
        checkpoints: Arc<dyn CheckpointStore>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let retry = RetryPolicy::with_config(
            RetryConfig::default().with_max_retries(config.sync_max_retries),
        );
        Self {
            source,
            store,
            lexical,
            vector,
            encoder,
            checkpoints,
            cache: None,
            config,
            retry,
        }
    }

    /// Attach the answer cache so re-ingest with a divergent hash evicts
    /// answers citing the affected recording.
    #[must_use]
    pub fn with_answer_cache(mut self, cache: Arc<AnswerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Run the pipeline from wherever the checkpoint left off, until the
    /// monitoring loop is cancelled.
    ///
    /// # Errors
    ///
    /// Returns checkpoint-store errors; per-day source failures stay in the
    /// checkpoint's error log instead.
    pub async fn run(&self, now: DateTime<Utc>, cancel: &CancelToken) -> Result<()> {
        let mut checkpoint = self.checkpoints.load().await?.unwrap_or_default();

        // A corpus that was already monitored resumes monitoring directly;
        // everything else starts (or resumes) the backfill.
        if checkpoint.phase == SyncPhase::Idle {
            checkpoint.phase = if checkpoint.last_processed_timestamp.is_some() {
                SyncPhase::Monitoring
            } else {
                SyncPhase::Downloading
            };
            self.checkpoints.save(&checkpoint).await?;
        }

        if checkpoint.phase == SyncPhase::Downloading {
            checkpoint = self.download_phase(checkpoint, now.date_naive(), cancel).await?;
        }
        if checkpoint.phase == SyncPhase::Indexing && !cancel.is_cancelled() {
            checkpoint = self.indexing_phase(checkpoint, now, cancel).await?;
        }
        if checkpoint.phase == SyncPhase::Monitoring && !cancel.is_cancelled() {
            self.monitoring_phase(checkpoint, cancel).await?;
        }
        Ok(())
    }

    /// Remove every artifact. Only honoured while the state machine is idle.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` when a sync phase is underway.
    pub async fn clear_all(&self) -> Result<()> {
        let checkpoint = self.checkpoints.load().await?.unwrap_or_default();
        if checkpoint.phase != SyncPhase::Idle {
            return Err(Error::InvalidState(format!(
                "clear_all requires the sync machine to be idle, found {}",
                checkpoint.phase
            )));
        }
        self.store.clear_all().await?;
        self.checkpoints.clear().await?;
        self.lexical.clear();
        info!("corpus cleared");
        Ok(())
    }

    /// Phase 1: walk backwards day by day, persisting everything new.
    ///
    /// Progress is checkpointed after every batch of days, so a crash never
    /// loses `processed_batches`. A day that keeps failing lands in the
    /// error log and the phase moves on.
    ///
    /// # Errors
    ///
    /// Returns checkpoint persistence errors only.
    #[instrument(skip_all)]
    pub async fn download_phase(
        &self,
        checkpoint: SyncCheckpoint,
        today: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<SyncCheckpoint> {
        let floor = today
            .checked_sub_months(Months::new(12 * self.config.max_years_back as u32))
            .unwrap_or(NaiveDate::MIN);
        self.download_range(checkpoint, today, floor, cancel).await
    }

    /// Download an explicit inclusive date window, newest first. The normal
    /// phase entry point derives the floor from `max_years_back` and
    /// delegates here.
    ///
    /// # Errors
    ///
    /// Returns checkpoint persistence errors only.
    pub async fn download_range(
        &self,
        mut checkpoint: SyncCheckpoint,
        today: NaiveDate,
        floor: NaiveDate,
        cancel: &CancelToken,
    ) -> Result<SyncCheckpoint> {
        let mut cursor = checkpoint.cursor.unwrap_or(today);
        info!(%cursor, %floor, "download phase starting");

        while cursor >= floor {
            if cancel.is_cancelled() {
                checkpoint.cursor = Some(cursor);
                self.checkpoints.save(&checkpoint).await?;
                info!(%cursor, "download phase interrupted");
                return Ok(checkpoint);
            }

            let batch_end = cursor;
            let batch_start = batch_end
                .checked_sub_days(Days::new(self.config.sync_batch_days as u64 - 1))
                .unwrap_or(NaiveDate::MIN)
                .max(floor);
            let key = SyncCheckpoint::batch_key(batch_start, batch_end);

            if checkpoint.processed_batches.contains(&key) {
                debug!(batch = %key, "batch already processed, skipping");
            } else {
                self.download_batch(&mut checkpoint, batch_start, batch_end, cancel)
                    .await;
                if cancel.is_cancelled() {
                    // Interrupted mid-batch: leave the batch unprocessed so
                    // the resume re-walks it (puts are idempotent).
                    checkpoint.cursor = Some(cursor);
                    self.checkpoints.save(&checkpoint).await?;
                    return Ok(checkpoint);
                }
                checkpoint.processed_batches.insert(key);
            }

            cursor = match batch_start.pred_opt() {
                Some(next) => next,
                None => break,
            };
            checkpoint.cursor = Some(cursor);
            self.checkpoints.save(&checkpoint).await?;
        }

        checkpoint.phase = SyncPhase::Indexing;
        checkpoint.cursor = None;
        self.checkpoints.save(&checkpoint).await?;
        info!("download phase complete");
        Ok(checkpoint)
    }

    async fn download_batch(
        &self,
        checkpoint: &mut SyncCheckpoint,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancelToken,
    ) {
        let mut day = end;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            match self.fetch_day(day).await {
                Ok(records) => {
                    for raw in &records {
                        if let Err(error) = self.persist_record(raw).await {
                            warn!(id = %raw.id, code = error.code(), %error, "record rejected");
                            checkpoint.errors.push(SyncErrorEntry::new(day, &error));
                        }
                    }
                    if !records.is_empty() {
                        checkpoint.observe_day(day);
                    }
                }
                Err(error) => {
                    warn!(%day, code = error.code(), %error, "day failed after retries");
                    checkpoint.errors.push(SyncErrorEntry::new(day, &error));
                }
            }
            if day == start {
                return;
            }
            let Some(prev) = day.pred_opt() else { return };
            day = prev;
        }
    }

    /// One rate-limited, retried source call.
    async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<RawRecording>> {
        sleep(self.config.source_call_delay).await;
        self.retry
            .execute(|| async { self.source.list_by_date(day).await })
            .await
    }

    /// Phase 2: chunk, embed and index everything persisted. No source calls.
    ///
    /// # Errors
    ///
    /// Returns checkpoint persistence errors; per-recording problems are
    /// logged and skipped.
    #[instrument(skip_all)]
    pub async fn indexing_phase(
        &self,
        mut checkpoint: SyncCheckpoint,
        now: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<SyncCheckpoint> {
        let stats = self.store.stats().await?;
        let (Some(earliest), Some(latest)) = (stats.earliest, stats.latest) else {
            checkpoint.phase = SyncPhase::Monitoring;
            checkpoint.last_processed_timestamp = Some(now);
            self.checkpoints.save(&checkpoint).await?;
            return Ok(checkpoint);
        };

        let mut day = checkpoint.cursor.unwrap_or(earliest);
        info!(%day, %latest, "indexing phase starting");
        while day <= latest {
            if cancel.is_cancelled() {
                checkpoint.cursor = Some(day);
                self.checkpoints.save(&checkpoint).await?;
                return Ok(checkpoint);
            }
            if let Err(error) = self.index_day(day).await {
                warn!(%day, code = error.code(), %error, "indexing day failed");
                checkpoint.errors.push(SyncErrorEntry::new(day, &error));
            }
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
            checkpoint.cursor = Some(day);
            self.checkpoints.save(&checkpoint).await?;
        }

        checkpoint.phase = SyncPhase::Monitoring;
        checkpoint.cursor = None;
        checkpoint.last_processed_timestamp = Some(now);
        self.checkpoints.save(&checkpoint).await?;
        info!("indexing phase complete");
        Ok(checkpoint)
    }

    async fn index_day(&self, day: NaiveDate) -> Result<()> {
        let ids = self.store.list_by_date(day).await?;
        let mut recordings = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(recording) = self.store.get(&id, day).await? else {
                continue;
            };
            // Reuse a persisted sidecar; only embed what has none yet.
            match self.store.get_embeddings(&id, day).await? {
                Some(embeddings) => self.vector.load(&recording, &embeddings)?,
                None => {
                    let chunks = chunk_recording(&recording, &self.chunker_config());
                    let embeddings = self.vector.upsert(&recording, &chunks, self.encoder.as_ref()).await?;
                    self.store.put_embeddings(&id, day, &embeddings).await?;
                }
            }
            recordings.push(recording);
        }
        self.lexical.add_batch(&recordings);
        Ok(())
    }

    /// Phase 3: poll for recordings newer than the watermark and ingest them
    /// through the same idempotent path, fully indexed.
    ///
    /// # Errors
    ///
    /// Returns checkpoint persistence errors only.
    pub async fn monitoring_phase(
        &self,
        mut checkpoint: SyncCheckpoint,
        cancel: &CancelToken,
    ) -> Result<()> {
        info!("monitoring phase starting");
        while !cancel.is_cancelled() {
            checkpoint = self.monitor_once(checkpoint).await?;
            sleep(self.config.poll_interval).await;
        }
        self.checkpoints.save(&checkpoint).await?;
        Ok(())
    }

    /// One monitoring poll; exposed separately so tests can drive it.
    ///
    /// # Errors
    ///
    /// Returns checkpoint persistence errors; source failures are logged
    /// into the checkpoint and the poll is retried next interval.
    pub async fn monitor_once(&self, mut checkpoint: SyncCheckpoint) -> Result<SyncCheckpoint> {
        let recent = match self
            .retry
            .execute(|| async { self.source.list_recent(MONITOR_FETCH_LIMIT).await })
            .await
        {
            Ok(recent) => recent,
            Err(error) => {
                warn!(code = error.code(), %error, "monitoring poll failed");
                checkpoint
                    .errors
                    .push(SyncErrorEntry::new(Utc::now().date_naive(), &error));
                self.checkpoints.save(&checkpoint).await?;
                return Ok(checkpoint);
            }
        };

        let watermark = checkpoint.last_processed_timestamp.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut newest = watermark;
        for raw in recent {
            if raw.start_time <= watermark {
                continue;
            }
            match self.ingest_full(&raw).await {
                Ok(PutOutcome::Unchanged) => {
                    debug!(id = %raw.id, "duplicate skipped");
                }
                Ok(PutOutcome::Inserted) => {
                    info!(id = %raw.id, "new recording ingested");
                }
                Err(error) => {
                    warn!(id = %raw.id, code = error.code(), %error, "ingest failed");
                    checkpoint
                        .errors
                        .push(SyncErrorEntry::new(raw.start_time.date_naive(), &error));
                }
            }
            if raw.start_time > newest {
                newest = raw.start_time;
            }
        }
        if newest > watermark {
            checkpoint.last_processed_timestamp = Some(newest);
            checkpoint.observe_day(newest.date_naive());
        }
        self.checkpoints.save(&checkpoint).await?;
        Ok(checkpoint)
    }

    /// Persist a raw recording without indexing (download phase).
    async fn persist_record(&self, raw: &RawRecording) -> Result<PutOutcome> {
        let recording = Self::to_recording(raw)?;
        let outcome = self.store.put(&recording).await;
        if let (Err(Error::DuplicateId(_)), Some(cache)) = (&outcome, &self.cache) {
            // The upstream content diverged from what answers were built on.
            cache.invalidate_citing(&raw.id).await;
        }
        outcome
    }

    /// Persist and index a raw recording (monitoring phase).
    async fn ingest_full(&self, raw: &RawRecording) -> Result<PutOutcome> {
        let recording = Self::to_recording(raw)?;
        let outcome = self.store.put(&recording).await;
        match &outcome {
            Ok(PutOutcome::Inserted) => {
                let chunks = chunk_recording(&recording, &self.chunker_config());
                let embeddings = self
                    .vector
                    .upsert(&recording, &chunks, self.encoder.as_ref())
                    .await?;
                self.store
                    .put_embeddings(&recording.id, recording.date(), &embeddings)
                    .await?;
                self.lexical.add_batch(std::slice::from_ref(&recording));
            }
            Ok(PutOutcome::Unchanged) => {}
            Err(Error::DuplicateId(_)) => {
                if let Some(cache) = &self.cache {
                    cache.invalidate_citing(&raw.id).await;
                }
            }
            Err(_) => {}
        }
        outcome
    }

    fn to_recording(raw: &RawRecording) -> Result<crate::types::Recording> {
        let headings = extract_headings(&raw.text);
        Ok(
            crate::types::Recording::new(
                raw.id.clone(),
                raw.title.clone(),
                raw.start_time,
                raw.end_time,
                raw.text.clone(),
            )?
            .with_headings(headings),
        )
    }

    fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            target_tokens: self.config.chunk_target_tokens,
            overlap_tokens: self.config.chunk_overlap_tokens(),
        }
    }
}
