//! Checkpoint persistence (`checkpoint.json`)

use crate::paths;
use async_trait::async_trait;
use lifelog_core::error::{Error, Result};
use lifelog_core::sync::{CheckpointStore, SyncCheckpoint};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Checkpoint file in the data directory, written atomically on every save.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    path: PathBuf,
}

impl FsCheckpointStore {
    /// Store the checkpoint under `data_dir/checkpoint.json`
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: data_dir.into().join(paths::CHECKPOINT_FILE),
        }
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
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
}

#[async_trait]
impl CheckpointStore for FsCheckpointStore {
    async fn load(&self) -> Result<Option<SyncCheckpoint>> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| Error::Corrupt(format!("unreadable checkpoint: {e}"))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        Self::write_atomic(&self.path, &bytes)?;
        debug!(phase = %checkpoint.phase, "checkpoint saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
