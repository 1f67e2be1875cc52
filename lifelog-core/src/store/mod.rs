//! Corpus storage abstraction
//!
//! The corpus store owns every recording, metadata sidecar and embedding
//! sidecar. Indexes only ever borrow read-only views. Backends implement
//! [`CorpusStore`]; the engine is written against the trait so the
//! date-sharded filesystem layout lives in its own crate.

pub mod chunker;
pub mod format;
pub mod validator;

use crate::error::Result;
use crate::types::{ChunkEmbedding, Recording, RecordingMetadata};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;

/// Outcome of a `put`: either the recording was new, or an identical copy
/// (same content hash) was already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The recording was written
    Inserted,
    /// A byte-identical recording already existed; nothing was written
    Unchanged,
}

/// Aggregate corpus statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusStats {
    /// Number of persisted recordings
    pub count: usize,
    /// Total bytes across bodies and sidecars
    pub bytes: u64,
    /// Date of the earliest recording, if any
    pub earliest: Option<NaiveDate>,
    /// Date of the latest recording, if any
    pub latest: Option<NaiveDate>,
}

/// Durable, crash-consistent storage of recordings and sidecars.
///
/// Implementations must guarantee that no partial write is ever visible:
/// body and meta are committed together or not at all. A body without a meta
/// (or vice versa) is corrupt and must be reported by the validator, not
/// served.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Persist a recording and its sidecar atomically.
    ///
    /// Idempotent when an identical recording (same content hash) exists.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` when `id` exists with a divergent hash, or
    /// `Storage`/`Io` on write failures.
    async fn put(&self, recording: &Recording) -> Result<PutOutcome>;

    /// Load a recording by id and date.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` for a half-written pair, `Storage`/`Io` otherwise.
    async fn get(&self, id: &str, date: NaiveDate) -> Result<Option<Recording>>;

    /// Load just the metadata sidecar.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on read failures.
    async fn get_metadata(&self, id: &str, date: NaiveDate) -> Result<Option<RecordingMetadata>>;

    /// O(1) existence check.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on probe failures.
    async fn exists(&self, id: &str, date: NaiveDate) -> Result<bool>;

    /// Ids of all recordings on `date`.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on listing failures.
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<String>>;

    /// Stream `(id, date)` pairs over an inclusive date range, oldest first.
    fn list_by_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxStream<'_, Result<(String, NaiveDate)>>;

    /// Aggregate statistics.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on scan failures.
    async fn stats(&self) -> Result<CorpusStats>;

    /// Remove everything. Callers must hold the sync machine in `Idle`;
    /// the engine enforces that before delegating here.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on removal failures.
    async fn clear_all(&self) -> Result<()>;

    /// Persist the embedding sidecar for a recording.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on write failures.
    async fn put_embeddings(
        &self,
        id: &str,
        date: NaiveDate,
        embeddings: &[ChunkEmbedding],
    ) -> Result<()>;

    /// Load the embedding sidecar, if present.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` when the sidecar exists but cannot be decoded.
    async fn get_embeddings(&self, id: &str, date: NaiveDate) -> Result<Option<Vec<ChunkEmbedding>>>;

    /// Move a corrupt artifact pair aside so the next sync pass re-downloads
    /// it. Queries never see quarantined recordings.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on move failures.
    async fn quarantine(&self, id: &str, date: NaiveDate) -> Result<()>;
}
