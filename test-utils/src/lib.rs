//! Shared fixtures and scripted fakes for engine and backend tests
//!
//! Everything here is deterministic: the mock source serves a scripted
//! day-to-recordings map (with optional failure injection for retry tests),
//! the mock reasoner replays a scripted verdict sequence, and recordings are
//! built with fixed timestamps.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lifelog_core::capabilities::{RawRecording, Reasoner, ReasonerVerdict, RecordingSource};
use lifelog_core::error::{Error, Result};
use lifelog_core::types::{Recording, SearchResult};
use lifelog_store_fs::{FsAnswerStore, FsCheckpointStore, FsCorpusStore};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

/// Build a recording starting at 09:00 UTC on the given day.
#[must_use]
pub fn recording_on(id: &str, date: NaiveDate, title: &str, text: &str) -> Recording {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).expect("valid fixed time"));
    let end = start + chrono::Duration::hours(1);
    Recording::new(id, title, start, end, text).expect("fixture recording is valid")
}

/// Build a raw (pre-ingest) recording starting at the given instant.
#[must_use]
pub fn raw_recording_at(id: &str, start: DateTime<Utc>, title: &str, text: &str) -> RawRecording {
    RawRecording {
        id: id.to_string(),
        title: title.to_string(),
        start_time: start,
        end_time: start + chrono::Duration::hours(1),
        text: text.to_string(),
    }
}

/// Build a raw recording starting at 09:00 UTC on the given day.
#[must_use]
pub fn raw_recording_on(id: &str, date: NaiveDate, title: &str, text: &str) -> RawRecording {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).expect("valid fixed time"));
    raw_recording_at(id, start, title, text)
}

/// Scripted recording source with failure injection and a call log.
#[derive(Default)]
pub struct MockRecordingSource {
    days: Mutex<BTreeMap<NaiveDate, Vec<RawRecording>>>,
    /// Dates that fail this many more times before succeeding
    failures: Mutex<BTreeMap<NaiveDate, u32>>,
    list_by_date_calls: Mutex<Vec<NaiveDate>>,
    list_recent_calls: Mutex<u32>,
}

impl MockRecordingSource {
    /// Empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the recordings served for a day
    pub fn add_day(&self, date: NaiveDate, records: Vec<RawRecording>) {
        self.days.lock().insert(date, records);
    }

    /// Make `date` fail `times` times before succeeding
    pub fn fail_date(&self, date: NaiveDate, times: u32) {
        self.failures.lock().insert(date, times);
    }

    /// Every `list_by_date` call observed, in order
    #[must_use]
    pub fn calls(&self) -> Vec<NaiveDate> {
        self.list_by_date_calls.lock().clone()
    }

    /// Number of `list_recent` polls observed
    #[must_use]
    pub fn recent_polls(&self) -> u32 {
        *self.list_recent_calls.lock()
    }
}

#[async_trait]
impl RecordingSource for MockRecordingSource {
    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<RawRecording>> {
        self.list_by_date_calls.lock().push(date);
        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&date) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::Source(format!("scripted failure for {date}")));
                }
            }
        }
        Ok(self.days.lock().get(&date).cloned().unwrap_or_default())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<RawRecording>> {
        *self.list_recent_calls.lock() += 1;
        let days = self.days.lock();
        let mut recent: Vec<RawRecording> = days.values().flatten().cloned().collect();
        recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        recent.truncate(limit);
        Ok(recent)
    }
}

/// Scripted reasoner replaying a verdict sequence; unavailable once drained.
pub struct MockReasoner {
    verdicts: Mutex<Vec<ReasonerVerdict>>,
    prompts: Mutex<Vec<String>>,
    evidence_sizes: Mutex<Vec<usize>>,
}

impl MockReasoner {
    /// Replay these verdicts in order
    #[must_use]
    pub fn new(verdicts: Vec<ReasonerVerdict>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts),
            prompts: Mutex::new(Vec::new()),
            evidence_sizes: Mutex::new(Vec::new()),
        }
    }

    /// A reasoner that always fails as unavailable
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(Vec::new())
    }

    /// Prompts received so far
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// Evidence sizes received so far
    #[must_use]
    pub fn evidence_sizes(&self) -> Vec<usize> {
        self.evidence_sizes.lock().clone()
    }

    /// How often the reasoner was consulted
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn assess(&self, prompt: &str, evidence: &[SearchResult]) -> Result<ReasonerVerdict> {
        self.prompts.lock().push(prompt.to_string());
        self.evidence_sizes.lock().push(evidence.len());
        let mut verdicts = self.verdicts.lock();
        if verdicts.is_empty() {
            Err(Error::ReasonerUnavailable)
        } else {
            Ok(verdicts.remove(0))
        }
    }
}

/// A temp-dir-backed corpus with all three persistence stores wired up.
pub struct TempCorpus {
    /// Keep the directory alive for the test's duration
    pub dir: TempDir,
    /// The corpus store
    pub store: Arc<FsCorpusStore>,
    /// The checkpoint store
    pub checkpoints: Arc<FsCheckpointStore>,
    /// The answer store
    pub answers: Arc<FsAnswerStore>,
}

impl TempCorpus {
    /// Create a fresh corpus in a temporary directory
    #[must_use]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let store =
            Arc::new(FsCorpusStore::open(dir.path()).expect("corpus store opens in temp dir"));
        let checkpoints = Arc::new(FsCheckpointStore::new(dir.path()));
        let answers = Arc::new(FsAnswerStore::new(dir.path()));
        Self {
            dir,
            store,
            checkpoints,
            answers,
        }
    }
}

impl Default for TempCorpus {
    fn default() -> Self {
        Self::new()
    }
}

/// Date helper for fixtures
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
}
