//! The upstream recording service, seen as an opaque capability

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A recording as delivered by the upstream service, before ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecording {
    /// Stable opaque identifier assigned upstream
    pub id: String,
    /// Title as assigned upstream
    pub title: String,
    /// Absolute start instant
    pub start_time: DateTime<Utc>,
    /// Absolute end instant
    pub end_time: DateTime<Utc>,
    /// Raw transcript text, line-oriented with speaker tags
    pub text: String,
}

/// Rate-limited source of recordings.
///
/// The service's range queries are known to be truncated, so the sync
/// pipeline only ever issues single-day queries. The core enforces its own
/// inter-call delay on top of whatever the service does.
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// All recordings that started on `date`.
    ///
    /// # Errors
    ///
    /// Returns `Source` on transport or upstream failures; such errors are
    /// retried with backoff by the caller.
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<RawRecording>>;

    /// The most recent recordings, newest first, at most `limit`.
    ///
    /// # Errors
    ///
    /// Returns `Source` on transport or upstream failures.
    async fn list_recent(&self, limit: usize) -> Result<Vec<RawRecording>>;
}
