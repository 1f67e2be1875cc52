//! Persistent answer-cache tier (`answers/<fingerprint>.json`)

use crate::paths;
use async_trait::async_trait;
use lifelog_core::cache::{AnswerCacheEntry, AnswerStore};
use lifelog_core::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// One JSON file per fingerprint under `answers/`.
#[derive(Debug, Clone)]
pub struct FsAnswerStore {
    dir: PathBuf,
}

impl FsAnswerStore {
    /// Store answers under `data_dir/answers/`
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: data_dir.into().join(paths::ANSWERS_DIR),
        }
    }

    fn path_of(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }
}

#[async_trait]
impl AnswerStore for FsAnswerStore {
    async fn load(&self, fingerprint: &str) -> Result<Option<AnswerCacheEntry>> {
        match fs::read_to_string(self.path_of(fingerprint)) {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Corrupt(format!("unreadable answer entry: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entry: &AnswerCacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_of(&entry.query_fingerprint);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(entry)?)?;
        fs::rename(&tmp, &path)?;
        debug!(fingerprint = %entry.query_fingerprint, "answer persisted");
        Ok(())
    }

    async fn remove(&self, fingerprint: &str) -> Result<()> {
        match fs::remove_file(self.path_of(fingerprint)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<AnswerCacheEntry>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut answers = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str(&raw) {
                Ok(answer) => answers.push(answer),
                // A torn entry is worthless but harmless; skip it.
                Err(_) => continue,
            }
        }
        answers.sort_by(|a: &AnswerCacheEntry, b: &AnswerCacheEntry| {
            a.query_fingerprint.cmp(&b.query_fingerprint)
        });
        Ok(answers)
    }
}
