//! Sync checkpoint state and persistence trait

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Phases of the sync state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// Nothing running; `clear_all` is only honoured here
    #[default]
    Idle,
    /// Backfilling day by day from the source
    Downloading,
    /// Chunking and embedding what was persisted
    Indexing,
    /// Polling for new recordings
    Monitoring,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Downloading => "downloading",
            SyncPhase::Indexing => "indexing",
            SyncPhase::Monitoring => "monitoring",
        };
        f.write_str(name)
    }
}

/// One logged sync failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncErrorEntry {
    /// Day the failure belongs to
    pub date: NaiveDate,
    /// Stable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl SyncErrorEntry {
    /// Record an error against a day
    #[must_use]
    pub fn new(date: NaiveDate, error: &Error) -> Self {
        Self {
            date,
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// The persisted progress of the sync pipeline (`checkpoint.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    /// Current phase
    pub phase: SyncPhase,
    /// Day the active phase works on next
    pub cursor: Option<NaiveDate>,
    /// Oldest day with observed recordings
    pub oldest_seen: Option<NaiveDate>,
    /// Newest day with observed recordings
    pub newest_seen: Option<NaiveDate>,
    /// Completed download batches, as `start..end` keys
    pub processed_batches: BTreeSet<String>,
    /// Watermark for the monitoring phase
    pub last_processed_timestamp: Option<DateTime<Utc>>,
    /// Accumulated non-fatal failures
    pub errors: Vec<SyncErrorEntry>,
}

impl SyncCheckpoint {
    /// Stable key for a download batch
    #[must_use]
    pub fn batch_key(start: NaiveDate, end: NaiveDate) -> String {
        format!("{start}..{end}")
    }

    /// Fold a day with data into the seen range
    pub fn observe_day(&mut self, day: NaiveDate) {
        self.oldest_seen = Some(self.oldest_seen.map_or(day, |d| d.min(day)));
        self.newest_seen = Some(self.newest_seen.map_or(day, |d| d.max(day)));
    }
}

/// Durable storage for the checkpoint; saved on every batch boundary.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint, `None` on a fresh corpus.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` for an undecodable file, `Storage`/`Io` otherwise.
    async fn load(&self) -> Result<Option<SyncCheckpoint>>;

    /// Persist the checkpoint atomically.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on write failures.
    async fn save(&self, checkpoint: &SyncCheckpoint) -> Result<()>;

    /// Remove the checkpoint, restarting the pipeline from scratch.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on removal failures.
    async fn clear(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn observe_day_tracks_the_range() {
        let mut checkpoint = SyncCheckpoint::default();
        checkpoint.observe_day(d(10));
        checkpoint.observe_day(d(5));
        checkpoint.observe_day(d(7));
        assert_eq!(checkpoint.oldest_seen, Some(d(5)));
        assert_eq!(checkpoint.newest_seen, Some(d(10)));
    }

    #[test]
    fn serialises_with_the_documented_keys() {
        let mut checkpoint = SyncCheckpoint {
            phase: SyncPhase::Downloading,
            cursor: Some(d(3)),
            ..SyncCheckpoint::default()
        };
        checkpoint.processed_batches.insert(SyncCheckpoint::batch_key(d(1), d(3)));
        let json = serde_json::to_value(&checkpoint).unwrap();
        assert!(json.get("phase").is_some());
        assert!(json.get("processedBatches").is_some());
        assert!(json.get("lastProcessedTimestamp").is_some());
        assert!(json.get("oldestSeen").is_some());
    }

    #[test]
    fn round_trips_through_json() {
        let mut checkpoint = SyncCheckpoint::default();
        checkpoint.phase = SyncPhase::Monitoring;
        checkpoint.observe_day(d(9));
        checkpoint.errors.push(SyncErrorEntry::new(
            d(9),
            &Error::Source("unreachable".into()),
        ));
        let json = serde_json::to_string(&checkpoint).unwrap();
        let back: SyncCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checkpoint);
    }
}
