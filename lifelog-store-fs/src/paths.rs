//! Path layout helpers
//!
//! The on-disk hierarchy is stable and bit-compatible across
//! implementations:
//!
//! ```text
//! <dataDir>/recordings/YYYY/MM/DD/<id>.body
//! <dataDir>/recordings/YYYY/MM/DD/<id>.meta
//! <dataDir>/embeddings/YYYY/MM/DD/<id>.vec
//! <dataDir>/checkpoint.json
//! <dataDir>/answers/<fingerprint>.json
//! <dataDir>/quarantine/...
//! ```

use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};

pub const RECORDINGS_DIR: &str = "recordings";
pub const EMBEDDINGS_DIR: &str = "embeddings";
pub const QUARANTINE_DIR: &str = "quarantine";
pub const ANSWERS_DIR: &str = "answers";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// `YYYY/MM/DD` shard fragment for a date.
#[must_use]
pub fn shard(date: NaiveDate) -> PathBuf {
    PathBuf::from(format!(
        "{:04}/{:02}/{:02}",
        date.year(),
        date.month(),
        date.day()
    ))
}

/// Directory holding a date's recording artifacts.
#[must_use]
pub fn recordings_day_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(RECORDINGS_DIR).join(shard(date))
}

/// Body file path.
#[must_use]
pub fn body_path(root: &Path, id: &str, date: NaiveDate) -> PathBuf {
    recordings_day_dir(root, date).join(format!("{id}.body"))
}

/// Metadata sidecar path.
#[must_use]
pub fn meta_path(root: &Path, id: &str, date: NaiveDate) -> PathBuf {
    recordings_day_dir(root, date).join(format!("{id}.meta"))
}

/// Embedding sidecar path.
#[must_use]
pub fn vec_path(root: &Path, id: &str, date: NaiveDate) -> PathBuf {
    root.join(EMBEDDINGS_DIR)
        .join(shard(date))
        .join(format!("{id}.vec"))
}

/// Quarantine destination for an artifact file name.
#[must_use]
pub fn quarantine_path(root: &Path, date: NaiveDate, file_name: &str) -> PathBuf {
    root.join(QUARANTINE_DIR).join(shard(date)).join(file_name)
}

/// Parse a shard directory triple back into a date.
#[must_use]
pub fn date_of_shard(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
