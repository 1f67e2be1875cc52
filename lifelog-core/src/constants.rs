//! Global constants for lifelog-core
//!
//! Centralizes the magic numbers used across the engine so the scoring and
//! sync behaviour can be audited in one place. Most of these are also
//! overridable through [`crate::config::EngineConfig`].

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    // Lexical scoring
    pub const BM25_K1: f32 = 1.2;
    pub const BM25_B: f32 = 0.75;
    /// Multiplier applied when a contiguous query phrase (len >= 2) matches
    pub const PHRASE_BOOST: f32 = 3.0;
    /// Multiplier applied to title/heading field hits
    pub const FIELD_BOOST: f32 = 2.0;
    /// A single strong match should normalise to roughly this score
    pub const STRONG_MATCH_TARGET: f32 = 0.7;

    // Chunking
    pub const CHUNK_TARGET_TOKENS: usize = 800;
    /// Overlap between consecutive chunks as a fraction of chunk size
    pub const CHUNK_OVERLAP_RATIO: f32 = 0.15;

    // Keyword extraction
    pub const MAX_KEYWORDS: usize = 20;

    // Embedding dimensions
    pub const EMBEDDING_DIMENSION_384: usize = 384;
    pub const EMBEDDING_DIMENSION_768: usize = 768;
    pub const DEFAULT_CORPUS_DIMENSION: usize = 384;

    // Hybrid search
    pub const HYBRID_LEXICAL_WEIGHT: f32 = 0.5;
    pub const HYBRID_VECTOR_WEIGHT: f32 = 0.5;
    /// Additive bonus for vector candidates on context-discovered dates
    pub const DISCOVERED_DATE_BONUS: f32 = 0.1;

    // Consensus ranking
    pub const STRATEGY_WEIGHT_LEXICAL: f32 = 0.5;
    pub const STRATEGY_WEIGHT_VECTOR: f32 = 0.35;
    pub const STRATEGY_WEIGHT_TEMPORAL: f32 = 0.15;
    pub const MULTI_STRATEGY_BONUS_2: f32 = 0.15;
    pub const MULTI_STRATEGY_BONUS_3: f32 = 0.25;
    pub const NO_LEXICAL_PENALTY: f32 = 0.2;
    pub const CONSENSUS_AVG_WEIGHT: f32 = 0.2;
    pub const CONSENSUS_MAX_WEIGHT: f32 = 0.3;
    pub const CONSENSUS_STRATEGY_WEIGHT: f32 = 0.5;

    // Iterative loop thresholds
    pub const EARLY_RETURN_THRESHOLD: f32 = 0.8;
    pub const ESCALATION_THRESHOLD: f32 = 0.5;
    pub const MAX_REFINEMENTS: usize = 4;
    /// Bounded number of Reasoner refine-request cycles
    pub const MAX_ESCALATIONS: usize = 2;
    /// Evidence passed to the Reasoner on escalation
    pub const ESCALATION_EVIDENCE_K: usize = 10;

    // Answer cache
    pub const CACHE_CONFIDENCE_THRESHOLD: f32 = 0.7;
    pub const ANSWER_CACHE_CAPACITY: usize = 256;

    // Timeouts
    pub const STRATEGY_DEADLINE: Duration = Duration::from_secs(2);
    pub const QUERY_DEADLINE: Duration = Duration::from_secs(30);

    // Sync pipeline
    pub const SOURCE_CALL_DELAY: Duration = Duration::from_secs(2);
    pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(60);
    pub const SYNC_BATCH_DAYS: usize = 50;
    pub const MAX_YEARS_BACK: i32 = 10;
    pub const SYNC_MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);
    pub const RETRY_MAX_DELAY: Duration = Duration::from_secs(5);
}

/// Environment variable names for operational controls
pub mod env_vars {
    pub const DATA_DIR: &str = "LIFELOG_DATA_DIR";
    pub const POLL_INTERVAL_SECS: &str = "LIFELOG_POLL_INTERVAL_SECS";
    pub const SOURCE_CALL_DELAY_MS: &str = "LIFELOG_SOURCE_CALL_DELAY_MS";
    pub const MAX_YEARS_BACK: &str = "LIFELOG_MAX_YEARS_BACK";
    pub const SYNC_BATCH_DAYS: &str = "LIFELOG_SYNC_BATCH_DAYS";
    pub const QUERY_DEADLINE_MS: &str = "LIFELOG_QUERY_DEADLINE_MS";
    pub const STRATEGY_DEADLINE_MS: &str = "LIFELOG_STRATEGY_DEADLINE_MS";
    pub const CACHE_THRESHOLD: &str = "LIFELOG_CACHE_THRESHOLD";
    pub const EARLY_RETURN_THRESHOLD: &str = "LIFELOG_EARLY_RETURN_THRESHOLD";
    pub const ESCALATION_THRESHOLD: &str = "LIFELOG_ESCALATION_THRESHOLD";
    pub const MAX_REFINEMENTS: &str = "LIFELOG_MAX_REFINEMENTS";
    pub const CORPUS_DIMENSION: &str = "LIFELOG_CORPUS_DIMENSION";
}
