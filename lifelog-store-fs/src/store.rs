//! Date-sharded filesystem corpus store

use crate::paths;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use lifelog_core::error::{Error, Result};
use lifelog_core::store::{format, CorpusStats, CorpusStore, PutOutcome};
use lifelog_core::text::extract_keywords;
use lifelog_core::types::{ChunkEmbedding, Recording, RecordingMetadata};
use lifelog_core::constants::defaults::MAX_KEYWORDS;
use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::task;
use tracing::{debug, info, warn};

/// Write `bytes` to `path` atomically: write a sibling tmp file, then rename.
/// No partial write is ever visible under the final name.
fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Filesystem-backed corpus store with the stable sharded layout.
///
/// Single-writer (the sync service), multi-reader. Every write goes through
/// write-tmp + rename; `put` is idempotent on content hash.
#[derive(Debug, Clone)]
pub struct FsCorpusStore {
    root: PathBuf,
}

impl FsCorpusStore {
    /// Open (and create) a store rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns `Io` when the directory tree cannot be created.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let root = data_dir.into();
        fs::create_dir_all(root.join(paths::RECORDINGS_DIR))?;
        fs::create_dir_all(root.join(paths::EMBEDDINGS_DIR))?;
        info!(root = %root.display(), "corpus store opened");
        Ok(Self { root })
    }

    /// The data directory this store owns
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn put_sync(root: &Path, recording: &Recording) -> Result<PutOutcome> {
        let date = recording.date();
        let meta_path = paths::meta_path(root, &recording.id, date);
        let new_hash = recording.content_hash();

        if let Some(existing) = read_optional(&meta_path)? {
            let existing: RecordingMetadata = serde_json::from_str(&existing)
                .map_err(|e| Error::Corrupt(format!("unreadable meta for {}: {e}", recording.id)))?;
            if existing.content_hash == new_hash {
                debug!(id = %recording.id, "identical recording already stored");
                return Ok(PutOutcome::Unchanged);
            }
            return Err(Error::DuplicateId(recording.id.clone()));
        }

        let keywords = extract_keywords(&recording.text, MAX_KEYWORDS);
        let speakers = format::extract_speakers(&recording.text);
        let meta = RecordingMetadata::for_recording(recording, keywords, speakers);

        let body_path = paths::body_path(root, &recording.id, date);
        atomic_write(&body_path, format::render_body(recording).as_bytes())?;
        atomic_write(&meta_path, serde_json::to_vec_pretty(&meta)?.as_slice())?;
        debug!(id = %recording.id, %date, "recording persisted");
        Ok(PutOutcome::Inserted)
    }

    fn list_day_sync(root: &Path, date: NaiveDate) -> Result<Vec<String>> {
        let dir = paths::recordings_day_dir(root, date);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".body") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn stats_sync(root: &Path) -> Result<CorpusStats> {
        let mut stats = CorpusStats::default();
        let recordings = root.join(paths::RECORDINGS_DIR);
        for date in Self::shard_dates(&recordings)? {
            let dir = paths::recordings_day_dir(root, date);
            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let metadata = entry.metadata()?;
                if name.ends_with(".body") {
                    stats.count += 1;
                    stats.earliest = Some(stats.earliest.map_or(date, |d: NaiveDate| d.min(date)));
                    stats.latest = Some(stats.latest.map_or(date, |d: NaiveDate| d.max(date)));
                }
                if name.ends_with(".body") || name.ends_with(".meta") {
                    stats.bytes += metadata.len();
                }
            }
        }
        Ok(stats)
    }

    /// All shard dates present under a layout root, ascending.
    fn shard_dates(layout_root: &Path) -> Result<Vec<NaiveDate>> {
        let mut dates = Vec::new();
        let years = match fs::read_dir(layout_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(dates),
            Err(e) => return Err(e.into()),
        };
        for year in years {
            let year = year?;
            let year_name = year.file_name();
            for month in fs::read_dir(year.path())? {
                let month = month?;
                let month_name = month.file_name();
                for day in fs::read_dir(month.path())? {
                    let day = day?;
                    let day_name = day.file_name();
                    let (Some(y), Some(m), Some(d)) = (
                        year_name.to_str(),
                        month_name.to_str(),
                        day_name.to_str(),
                    ) else {
                        continue;
                    };
                    if let Some(date) = paths::date_of_shard(y, m, d) {
                        dates.push(date);
                    }
                }
            }
        }
        dates.sort_unstable();
        Ok(dates)
    }

    fn quarantine_sync(root: &Path, id: &str, date: NaiveDate) -> Result<()> {
        for path in [
            paths::body_path(root, id, date),
            paths::meta_path(root, id, date),
            paths::vec_path(root, id, date),
        ] {
            if !path.exists() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let target = paths::quarantine_path(root, date, name);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::rename(&path, &target)?;
            warn!(id, %date, file = name, "artifact quarantined");
        }
        Ok(())
    }
}

#[async_trait]
impl CorpusStore for FsCorpusStore {
    async fn put(&self, recording: &Recording) -> Result<PutOutcome> {
        let root = self.root.clone();
        let recording = recording.clone();
        task::spawn_blocking(move || Self::put_sync(&root, &recording))
            .await
            .map_err(|e| Error::Storage(format!("put task failed: {e}")))?
    }

    async fn get(&self, id: &str, date: NaiveDate) -> Result<Option<Recording>> {
        let path = paths::body_path(&self.root, id, date);
        let id = id.to_string();
        task::spawn_blocking(move || {
            let Some(raw) = read_optional(&path)? else {
                return Ok(None);
            };
            format::parse_body(&raw)
                .map(Some)
                .map_err(|e| Error::Corrupt(format!("unreadable body for {id}: {e}")))
        })
        .await
        .map_err(|e| Error::Storage(format!("get task failed: {e}")))?
    }

    async fn get_metadata(&self, id: &str, date: NaiveDate) -> Result<Option<RecordingMetadata>> {
        let path = paths::meta_path(&self.root, id, date);
        let id = id.to_string();
        match read_optional(&path)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Corrupt(format!("unreadable meta for {id}: {e}"))),
        }
    }

    async fn exists(&self, id: &str, date: NaiveDate) -> Result<bool> {
        // Half-written pairs do not count; they get re-downloaded.
        Ok(paths::body_path(&self.root, id, date).exists()
            && paths::meta_path(&self.root, id, date).exists())
    }

    async fn list_by_date(&self, date: NaiveDate) -> Result<Vec<String>> {
        let root = self.root.clone();
        task::spawn_blocking(move || Self::list_day_sync(&root, date))
            .await
            .map_err(|e| Error::Storage(format!("list task failed: {e}")))?
    }

    fn list_by_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BoxStream<'_, Result<(String, NaiveDate)>> {
        struct RangeState {
            root: PathBuf,
            next: Option<NaiveDate>,
            to: NaiveDate,
            buffer: VecDeque<(String, NaiveDate)>,
        }
        let state = RangeState {
            root: self.root.clone(),
            next: Some(from),
            to,
            buffer: VecDeque::new(),
        };
        Box::pin(futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(item) = state.buffer.pop_front() {
                    return Some((Ok(item), state));
                }
                let date = state.next?;
                if date > state.to {
                    state.next = None;
                    return None;
                }
                state.next = date.succ_opt();
                match Self::list_day_sync(&state.root, date) {
                    Ok(ids) => state
                        .buffer
                        .extend(ids.into_iter().map(|id| (id, date))),
                    Err(error) => return Some((Err(error), state)),
                }
            }
        }))
    }

    async fn stats(&self) -> Result<CorpusStats> {
        let root = self.root.clone();
        task::spawn_blocking(move || Self::stats_sync(&root))
            .await
            .map_err(|e| Error::Storage(format!("stats task failed: {e}")))?
    }

    async fn clear_all(&self) -> Result<()> {
        for dir in [
            paths::RECORDINGS_DIR,
            paths::EMBEDDINGS_DIR,
            paths::QUARANTINE_DIR,
        ] {
            let path = self.root.join(dir);
            match fs::remove_dir_all(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        fs::create_dir_all(self.root.join(paths::RECORDINGS_DIR))?;
        fs::create_dir_all(self.root.join(paths::EMBEDDINGS_DIR))?;
        info!("corpus store cleared");
        Ok(())
    }

    async fn put_embeddings(
        &self,
        id: &str,
        date: NaiveDate,
        embeddings: &[ChunkEmbedding],
    ) -> Result<()> {
        let path = paths::vec_path(&self.root, id, date);
        let bytes = serde_json::to_vec(embeddings)?;
        task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| Error::Storage(format!("embedding write task failed: {e}")))?
    }

    async fn get_embeddings(&self, id: &str, date: NaiveDate) -> Result<Option<Vec<ChunkEmbedding>>> {
        let path = paths::vec_path(&self.root, id, date);
        let id = id.to_string();
        match read_optional(&path)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Corrupt(format!("unreadable embeddings for {id}: {e}"))),
        }
    }

    async fn quarantine(&self, id: &str, date: NaiveDate) -> Result<()> {
        let root = self.root.clone();
        let id = id.to_string();
        task::spawn_blocking(move || Self::quarantine_sync(&root, &id, date))
            .await
            .map_err(|e| Error::Storage(format!("quarantine task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;

    fn recording(id: &str, day: u32, text: &str) -> Recording {
        Recording::new(
            id,
            "Store test",
            Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, day, 10, 0, 0).unwrap(),
            text,
        )
        .unwrap()
    }

    fn store() -> (tempfile::TempDir, FsCorpusStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCorpusStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_round_trip() {
        let (_dir, store) = store();
        let r = recording("rec-1", 5, "Alice (09:00): hello there");
        assert_eq!(store.put(&r).await.unwrap(), PutOutcome::Inserted);
        let loaded = store.get("rec-1", r.date()).await.unwrap().unwrap();
        assert_eq!(loaded, r);
        assert!(store.exists("rec-1", r.date()).await.unwrap());
    }

    #[tokio::test]
    async fn put_is_idempotent_on_same_hash() {
        let (_dir, store) = store();
        let r = recording("rec-1", 5, "same text");
        assert_eq!(store.put(&r).await.unwrap(), PutOutcome::Inserted);
        assert_eq!(store.put(&r).await.unwrap(), PutOutcome::Unchanged);
    }

    #[tokio::test]
    async fn divergent_hash_is_duplicate_id() {
        let (_dir, store) = store();
        store.put(&recording("rec-1", 5, "original")).await.unwrap();
        let err = store.put(&recording("rec-1", 5, "changed")).await.unwrap_err();
        assert_eq!(err.code(), "E_DUPLICATE_ID");
    }

    #[tokio::test]
    async fn meta_sidecar_carries_keywords_and_speakers() {
        let (_dir, store) = store();
        let r = recording("rec-1", 5, "Alice (09:00): budget budget review");
        store.put(&r).await.unwrap();
        let meta = store.get_metadata("rec-1", r.date()).await.unwrap().unwrap();
        assert_eq!(meta.content_hash, r.content_hash());
        assert!(meta.keywords.contains(&"budget".to_string()));
        assert_eq!(meta.speakers, vec!["Alice".to_string()]);
    }

    #[tokio::test]
    async fn list_by_date_is_sorted() {
        let (_dir, store) = store();
        store.put(&recording("rec-b", 5, "x")).await.unwrap();
        store.put(&recording("rec-a", 5, "y")).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
        assert_eq!(store.list_by_date(date).await.unwrap(), vec!["rec-a", "rec-b"]);
    }

    #[tokio::test]
    async fn range_stream_walks_oldest_first() {
        let (_dir, store) = store();
        store.put(&recording("rec-1", 7, "x")).await.unwrap();
        store.put(&recording("rec-2", 5, "y")).await.unwrap();
        let from = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let entries: Vec<_> = store
            .list_by_range(from, to)
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(entries[0].0, "rec-2");
        assert_eq!(entries[1].0, "rec-1");
    }

    #[tokio::test]
    async fn stats_cover_count_and_range() {
        let (_dir, store) = store();
        store.put(&recording("rec-1", 5, "x")).await.unwrap();
        store.put(&recording("rec-2", 7, "y")).await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 2);
        assert!(stats.bytes > 0);
        assert_eq!(stats.earliest, Some(NaiveDate::from_ymd_opt(2025, 6, 5).unwrap()));
        assert_eq!(stats.latest, Some(NaiveDate::from_ymd_opt(2025, 6, 7).unwrap()));
    }

    #[tokio::test]
    async fn embeddings_round_trip() {
        let (_dir, store) = store();
        let r = recording("rec-1", 5, "x");
        store.put(&r).await.unwrap();
        let embeddings = vec![ChunkEmbedding {
            chunk_index: 0,
            start_offset: 0,
            end_offset: 1,
            vector: vec![0.25, 0.5],
        }];
        store.put_embeddings("rec-1", r.date(), &embeddings).await.unwrap();
        let loaded = store.get_embeddings("rec-1", r.date()).await.unwrap().unwrap();
        assert_eq!(loaded, embeddings);
    }

    #[tokio::test]
    async fn quarantine_hides_the_pair() {
        let (_dir, store) = store();
        let r = recording("rec-1", 5, "x");
        store.put(&r).await.unwrap();
        store.quarantine("rec-1", r.date()).await.unwrap();
        assert!(!store.exists("rec-1", r.date()).await.unwrap());
        assert!(store.get("rec-1", r.date()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_all_empties_the_store() {
        let (_dir, store) = store();
        store.put(&recording("rec-1", 5, "x")).await.unwrap();
        store.clear_all().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.earliest, None);
    }
}
