//! Recording and metadata sidecar types

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute the stable content hash for a recording body.
///
/// The hash covers the fields that make a recording what it is: id, title,
/// time bounds and transcript text. Two `put` calls with the same hash are
/// idempotent; the same id with a divergent hash is an invariant violation.
#[must_use]
pub fn content_hash(id: &str, title: &str, start: DateTime<Utc>, end: DateTime<Utc>, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b"\0");
    hasher.update(title.as_bytes());
    hasher.update(b"\0");
    hasher.update(start.to_rfc3339().as_bytes());
    hasher.update(b"\0");
    hasher.update(end.to_rfc3339().as_bytes());
    hasher.update(b"\0");
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One timestamped transcript with speaker-attributed utterances.
///
/// The atomic unit of the corpus. Once persisted, `(id, start_time)` is
/// immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Stable opaque identifier, globally unique
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Absolute start instant
    pub start_time: DateTime<Utc>,
    /// Absolute end instant, never before `start_time`
    pub end_time: DateTime<Utc>,
    /// Transcript body, line-oriented with speaker tags and embedded
    /// per-utterance timestamps
    pub text: String,
    /// Ordered section markers extracted from the transcript
    #[serde(default)]
    pub headings: Vec<String>,
}

impl Recording {
    /// Create a recording, checking the structural invariants.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `id` is empty or `end_time < start_time`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        text: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidInput("recording id must not be empty".into()));
        }
        if end_time < start_time {
            return Err(Error::InvalidInput(format!(
                "recording {id}: end_time precedes start_time"
            )));
        }
        // Titles are single-line in the body format.
        let title = title.into().replace(['\r', '\n'], " ");
        Ok(Self {
            id,
            title,
            start_time,
            end_time,
            text: text.into(),
            headings: Vec::new(),
        })
    }

    /// Attach extracted headings
    #[must_use]
    pub fn with_headings(mut self, headings: Vec<String>) -> Self {
        self.headings = headings;
        self
    }

    /// Calendar date of the recording start, used for sharding
    #[must_use]
    pub fn date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    /// Duration in whole seconds
    #[must_use]
    pub fn duration_seconds(&self) -> i64 {
        (self.end_time - self.start_time).num_seconds()
    }

    /// Content hash over the identity-bearing fields
    #[must_use]
    pub fn content_hash(&self) -> String {
        content_hash(&self.id, &self.title, self.start_time, self.end_time, &self.text)
    }
}

/// Compact sidecar written atomically with the recording body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    /// Recording id
    pub id: String,
    /// Absolute start instant
    pub start_time: DateTime<Utc>,
    /// Absolute end instant
    pub end_time: DateTime<Utc>,
    /// Whole-second duration
    pub duration_seconds: i64,
    /// Hash of the identity-bearing fields of the body
    pub content_hash: String,
    /// Extracted keyword bag, at most 20 stems
    pub keywords: Vec<String>,
    /// Distinct speakers appearing in the transcript
    pub speakers: Vec<String>,
}

impl RecordingMetadata {
    /// Build the sidecar for a recording with pre-extracted keywords/speakers
    #[must_use]
    pub fn for_recording(recording: &Recording, keywords: Vec<String>, speakers: Vec<String>) -> Self {
        Self {
            id: recording.id.clone(),
            start_time: recording.start_time,
            end_time: recording.end_time,
            duration_seconds: recording.duration_seconds(),
            content_hash: recording.content_hash(),
            keywords,
            speakers,
        }
    }
}
