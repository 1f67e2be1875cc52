//! Answer cache
//!
//! Content-addressed memoisation of high-confidence answers, keyed by the
//! sha-256 fingerprint of the normalised query. Entries never expire on
//! time; they are evicted when a cited recording is re-ingested with a
//! changed content hash. An in-memory LRU tier sits in front of the
//! persistent store, and the cache is consulted before the iterative loop
//! ever runs.

use crate::error::Result;
use crate::types::EngineAnswer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fingerprint of a normalised query.
#[must_use]
pub fn fingerprint(normalized_query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_query.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One cached answer (`answers/<fingerprint>.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCacheEntry {
    /// Fingerprint the entry is addressed by
    pub query_fingerprint: String,
    /// The cached answer text
    pub answer_text: String,
    /// Confidence the answer was produced with
    pub confidence: f32,
    /// Recording ids the answer cites
    pub citations: Vec<String>,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
}

impl AnswerCacheEntry {
    /// Build an entry from a finished answer
    #[must_use]
    pub fn from_answer(fingerprint: String, answer: &EngineAnswer) -> Self {
        Self {
            query_fingerprint: fingerprint,
            answer_text: answer.answer_text.clone(),
            confidence: answer.confidence,
            citations: answer.citations.clone(),
            created_at: Utc::now(),
        }
    }
}

/// Persistent tier of the answer cache.
#[async_trait]
pub trait AnswerStore: Send + Sync {
    /// Load an entry by fingerprint.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on read failures.
    async fn load(&self, fingerprint: &str) -> Result<Option<AnswerCacheEntry>>;

    /// Persist an entry atomically.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on write failures.
    async fn save(&self, entry: &AnswerCacheEntry) -> Result<()>;

    /// Remove an entry.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on removal failures.
    async fn remove(&self, fingerprint: &str) -> Result<()>;

    /// Every persisted entry, for citation-based invalidation.
    ///
    /// # Errors
    ///
    /// Returns `Storage`/`Io` on listing failures.
    async fn list(&self) -> Result<Vec<AnswerCacheEntry>>;
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that fell through to the search loop
    pub misses: u64,
    /// Answers admitted to the cache
    pub stores: u64,
    /// Entries evicted by citation invalidation
    pub invalidations: u64,
}

/// Two-tier answer cache with a confidence gate.
pub struct AnswerCache {
    memory: Mutex<LruCache<String, AnswerCacheEntry>>,
    store: Option<Arc<dyn AnswerStore>>,
    threshold: f32,
    metrics: Mutex<CacheMetrics>,
}

impl AnswerCache {
    /// Create a cache holding at most `capacity` entries in memory.
    ///
    /// Only answers with confidence at or above `threshold` are admitted.
    #[must_use]
    pub fn new(capacity: usize, threshold: f32) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            store: None,
            threshold,
            metrics: Mutex::new(CacheMetrics::default()),
        }
    }

    /// Attach the persistent tier
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn AnswerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Observed counters
    #[must_use]
    pub fn metrics(&self) -> CacheMetrics {
        *self.metrics.lock()
    }

    /// Look up a cached answer for a normalised query.
    pub async fn get(&self, normalized_query: &str) -> Option<AnswerCacheEntry> {
        let key = fingerprint(normalized_query);
        if let Some(entry) = self.memory.lock().get(&key).cloned() {
            self.metrics.lock().hits += 1;
            debug!(fingerprint = %key, "answer cache hit (memory)");
            return Some(entry);
        }
        if let Some(store) = &self.store {
            match store.load(&key).await {
                Ok(Some(entry)) => {
                    self.memory.lock().put(key.clone(), entry.clone());
                    self.metrics.lock().hits += 1;
                    debug!(fingerprint = %key, "answer cache hit (store)");
                    return Some(entry);
                }
                Ok(None) => {}
                Err(error) => warn!(%error, "answer store lookup failed"),
            }
        }
        self.metrics.lock().misses += 1;
        None
    }

    /// Admit an answer if it clears the confidence gate.
    pub async fn put(&self, normalized_query: &str, answer: &EngineAnswer) {
        if answer.confidence < self.threshold {
            return;
        }
        let key = fingerprint(normalized_query);
        let entry = AnswerCacheEntry::from_answer(key.clone(), answer);
        if let Some(store) = &self.store {
            if let Err(error) = store.save(&entry).await {
                warn!(%error, "answer store write failed");
            }
        }
        self.memory.lock().put(key, entry);
        self.metrics.lock().stores += 1;
    }

    /// Evict every entry citing `recording_id`; called when a recording is
    /// re-ingested with a changed content hash.
    pub async fn invalidate_citing(&self, recording_id: &str) {
        let mut evicted = 0u64;
        {
            let mut memory = self.memory.lock();
            let stale: Vec<String> = memory
                .iter()
                .filter(|(_, entry)| entry.citations.iter().any(|c| c == recording_id))
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                memory.pop(&key);
                evicted += 1;
            }
        }
        if let Some(store) = &self.store {
            match store.list().await {
                Ok(entries) => {
                    for entry in entries {
                        if entry.citations.iter().any(|c| c == recording_id) {
                            if let Err(error) = store.remove(&entry.query_fingerprint).await {
                                warn!(%error, "answer store eviction failed");
                            } else {
                                evicted += 1;
                            }
                        }
                    }
                }
                Err(error) => warn!(%error, "answer store listing failed"),
            }
        }
        if evicted > 0 {
            debug!(recording_id, evicted, "invalidated cached answers");
            self.metrics.lock().invalidations += evicted;
        }
    }
}
