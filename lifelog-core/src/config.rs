//! Engine configuration
//!
//! Every operational control from the deployment surface lives here with a
//! documented default. The confidence and bonus constants are deliberately
//! configuration rather than hard-coded values: they have been retuned more
//! than once, so the e2e scenarios pin behaviour instead of constants.

use crate::constants::{defaults, env_vars};
use crate::error::{Error, Result};
use std::time::Duration;

/// Configuration for the whole search engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Declared corpus embedding dimension (the dimension-fix contract)
    pub corpus_dimension: usize,
    /// Whether a mismatched encoder gets the pad/truncate dimension-fix.
    /// With the fix disabled, the first mismatched call is a fatal
    /// `DimensionMismatch`.
    pub dimension_fix: bool,
    /// Per-strategy deadline inside the parallel executor
    pub strategy_deadline: Duration,
    /// Per-query wall clock, escalation included
    pub query_deadline: Duration,
    /// Confidence at or above which results are returned without refinement
    pub early_return_threshold: f32,
    /// Confidence below which (after refinements) the Reasoner is consulted
    pub escalation_threshold: f32,
    /// Maximum refinement rounds before escalation
    pub max_refinements: usize,
    /// Maximum Reasoner refine-request cycles
    pub max_escalations: usize,
    /// Evidence size handed to the Reasoner
    pub escalation_evidence_k: usize,
    /// Minimum confidence for an answer to enter the cache
    pub cache_threshold: f32,
    /// In-memory answer cache capacity
    pub answer_cache_capacity: usize,
    /// Delay enforced between consecutive recording-source calls
    pub source_call_delay: Duration,
    /// Monitoring-phase poll interval
    pub poll_interval: Duration,
    /// Days per checkpointed download batch
    pub sync_batch_days: usize,
    /// Download phase stops when the cursor predates this many years
    pub max_years_back: i32,
    /// Retries per failed sync day before it lands in the error log
    pub sync_max_retries: u32,
    /// Hybrid search lexical weight (vector weight is the complement)
    pub hybrid_lexical_weight: f32,
    /// Additive vector-index bonus for context-discovered dates
    pub discovered_date_bonus: f32,
    /// Chunk size target in tokens
    pub chunk_target_tokens: usize,
    /// Overlap between consecutive chunks as a fraction of chunk size
    pub chunk_overlap_ratio: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            corpus_dimension: defaults::DEFAULT_CORPUS_DIMENSION,
            dimension_fix: true,
            strategy_deadline: defaults::STRATEGY_DEADLINE,
            query_deadline: defaults::QUERY_DEADLINE,
            early_return_threshold: defaults::EARLY_RETURN_THRESHOLD,
            escalation_threshold: defaults::ESCALATION_THRESHOLD,
            max_refinements: defaults::MAX_REFINEMENTS,
            max_escalations: defaults::MAX_ESCALATIONS,
            escalation_evidence_k: defaults::ESCALATION_EVIDENCE_K,
            cache_threshold: defaults::CACHE_CONFIDENCE_THRESHOLD,
            answer_cache_capacity: defaults::ANSWER_CACHE_CAPACITY,
            source_call_delay: defaults::SOURCE_CALL_DELAY,
            poll_interval: defaults::MONITOR_POLL_INTERVAL,
            sync_batch_days: defaults::SYNC_BATCH_DAYS,
            max_years_back: defaults::MAX_YEARS_BACK,
            sync_max_retries: defaults::SYNC_MAX_RETRIES,
            hybrid_lexical_weight: defaults::HYBRID_LEXICAL_WEIGHT,
            discovered_date_bonus: defaults::DISCOVERED_DATE_BONUS,
            chunk_target_tokens: defaults::CHUNK_TARGET_TOKENS,
            chunk_overlap_ratio: defaults::CHUNK_OVERLAP_RATIO,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable (unparsable values are
    /// logged and ignored).
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_usize(env_vars::CORPUS_DIMENSION) {
            config.corpus_dimension = v;
        }
        if let Some(v) = env_u64(env_vars::STRATEGY_DEADLINE_MS) {
            config.strategy_deadline = Duration::from_millis(v);
        }
        if let Some(v) = env_u64(env_vars::QUERY_DEADLINE_MS) {
            config.query_deadline = Duration::from_millis(v);
        }
        if let Some(v) = env_f32(env_vars::EARLY_RETURN_THRESHOLD) {
            config.early_return_threshold = v;
        }
        if let Some(v) = env_f32(env_vars::ESCALATION_THRESHOLD) {
            config.escalation_threshold = v;
        }
        if let Some(v) = env_usize(env_vars::MAX_REFINEMENTS) {
            config.max_refinements = v;
        }
        if let Some(v) = env_f32(env_vars::CACHE_THRESHOLD) {
            config.cache_threshold = v;
        }
        if let Some(v) = env_u64(env_vars::SOURCE_CALL_DELAY_MS) {
            config.source_call_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_u64(env_vars::POLL_INTERVAL_SECS) {
            config.poll_interval = Duration::from_secs(v);
        }
        if let Some(v) = env_usize(env_vars::SYNC_BATCH_DAYS) {
            config.sync_batch_days = v;
        }
        if let Some(v) = env_i32(env_vars::MAX_YEARS_BACK) {
            config.max_years_back = v;
        }
        config
    }

    /// Validate threshold and weight ranges.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a threshold falls outside [0, 1], the
    /// dimension is zero, or a batch/refinement bound is zero.
    pub fn validate(&self) -> Result<()> {
        if self.corpus_dimension == 0 {
            return Err(Error::Configuration("corpus_dimension must be non-zero".into()));
        }
        for (name, value) in [
            ("early_return_threshold", self.early_return_threshold),
            ("escalation_threshold", self.escalation_threshold),
            ("cache_threshold", self.cache_threshold),
            ("hybrid_lexical_weight", self.hybrid_lexical_weight),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Configuration(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.discovered_date_bonus > 0.1 {
            return Err(Error::Configuration(format!(
                "discovered_date_bonus is capped at 0.1, got {}",
                self.discovered_date_bonus
            )));
        }
        if self.sync_batch_days == 0 {
            return Err(Error::Configuration("sync_batch_days must be non-zero".into()));
        }
        if !(0.0..0.5).contains(&self.chunk_overlap_ratio) {
            return Err(Error::Configuration(format!(
                "chunk_overlap_ratio must be within [0, 0.5), got {}",
                self.chunk_overlap_ratio
            )));
        }
        Ok(())
    }

    /// Hybrid vector weight, the complement of the lexical weight
    #[must_use]
    pub fn hybrid_vector_weight(&self) -> f32 {
        1.0 - self.hybrid_lexical_weight
    }

    /// Overlap in tokens between consecutive chunks
    #[must_use]
    pub fn chunk_overlap_tokens(&self) -> usize {
        (self.chunk_target_tokens as f32 * self.chunk_overlap_ratio) as usize
    }
}

fn env_raw(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_usize(name: &str) -> Option<usize> {
    let raw = env_raw(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = env_raw(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}

fn env_i32(name: &str) -> Option<i32> {
    let raw = env_raw(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}

fn env_f32(name: &str) -> Option<f32> {
    let raw = env_raw(name)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparsable env override");
            None
        }
    }
}
