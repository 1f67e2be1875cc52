//! Engine facade
//!
//! Wires the indexes, strategies, executor, iterative loop and answer cache
//! into one entry point. The cache is consulted before any search work
//! happens; confident answers flow back into it on the way out.

use crate::cache::AnswerCache;
use crate::cancel::CancelToken;
use crate::capabilities::{Encoder, Reasoner};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::{IndexMetadata, LexicalIndex, VectorIndex};
use crate::query::QueryAnalyzer;
use crate::search::consensus;
use crate::search::context::SharedContext;
use crate::search::executor::ParallelExecutor;
use crate::search::iterative::IterativeSearchLoop;
use crate::search::strategy::default_strategies;
use crate::store::{CorpusStats, CorpusStore};
use crate::text;
use crate::types::{AnswerSource, EngineAnswer, SearchResponse};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument};

/// The multi-strategy search engine over a local corpus.
pub struct SearchEngine {
    config: Arc<EngineConfig>,
    store: Arc<dyn CorpusStore>,
    lexical: Arc<LexicalIndex>,
    vector: Arc<VectorIndex>,
    encoder: Arc<dyn Encoder>,
    cache: Arc<AnswerCache>,
    analyzer: QueryAnalyzer,
    reasoner: Option<Arc<dyn Reasoner>>,
    session_root: Option<PathBuf>,
}

impl SearchEngine {
    /// Assemble an engine over a corpus store and encoder.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn CorpusStore>,
        encoder: Arc<dyn Encoder>,
    ) -> Self {
        let config = Arc::new(config);
        let vector = if config.dimension_fix {
            Arc::new(VectorIndex::new(config.corpus_dimension))
        } else {
            Arc::new(VectorIndex::strict(config.corpus_dimension))
        };
        let cache = Arc::new(AnswerCache::new(
            config.answer_cache_capacity,
            config.cache_threshold,
        ));
        Self {
            config,
            store,
            lexical: Arc::new(LexicalIndex::new()),
            vector,
            encoder,
            cache,
            analyzer: QueryAnalyzer::new(),
            reasoner: None,
            session_root: None,
        }
    }

    /// Attach the escalation reasoner
    #[must_use]
    pub fn with_reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Replace the answer cache (e.g. to attach a persistent tier)
    #[must_use]
    pub fn with_answer_cache(mut self, cache: Arc<AnswerCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Persist loop sessions under this directory
    #[must_use]
    pub fn with_session_root(mut self, root: PathBuf) -> Self {
        self.session_root = Some(root);
        self
    }

    /// The shared lexical index (the sync service feeds it)
    #[must_use]
    pub fn lexical_index(&self) -> Arc<LexicalIndex> {
        Arc::clone(&self.lexical)
    }

    /// The shared vector index (the sync service feeds it)
    #[must_use]
    pub fn vector_index(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.vector)
    }

    /// The shared answer cache
    #[must_use]
    pub fn answer_cache(&self) -> Arc<AnswerCache> {
        Arc::clone(&self.cache)
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config)
    }

    /// Rebuild the in-memory indexes from the persisted corpus, reusing
    /// embedding sidecars so nothing is re-encoded.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the corpus scan.
    #[instrument(skip_all)]
    pub async fn hydrate(&self) -> Result<usize> {
        let stats = self.store.stats().await?;
        let (Some(earliest), Some(latest)) = (stats.earliest, stats.latest) else {
            return Ok(0);
        };
        let mut loaded = 0usize;
        let mut batch = Vec::new();
        let mut entries = self.store.list_by_range(earliest, latest);
        while let Some(entry) = entries.next().await {
            let (id, date) = entry?;
            let Some(recording) = self.store.get(&id, date).await? else {
                continue;
            };
            if let Some(embeddings) = self.store.get_embeddings(&id, date).await? {
                self.vector.load(&recording, &embeddings)?;
            }
            batch.push(recording);
            loaded += 1;
        }
        drop(entries);
        self.lexical.add_batch(&batch);
        info!(loaded, "indexes hydrated from corpus");
        Ok(loaded)
    }

    /// Answer a question, consulting the cache first.
    ///
    /// A cache hit returns without running the executor, marked
    /// `source = cache`. A fresh answer that clears the confidence gate is
    /// admitted to the cache on the way out.
    #[instrument(skip_all, fields(question = %question))]
    pub async fn answer(
        &self,
        question: &str,
        now: DateTime<Utc>,
        k: usize,
        cancel: &CancelToken,
    ) -> EngineAnswer {
        let normalized = text::normalize(question);
        if let Some(entry) = self.cache.get(&normalized).await {
            return EngineAnswer {
                answer_text: entry.answer_text,
                confidence: entry.confidence,
                citations: entry.citations,
                source: AnswerSource::Cache,
                rounds: 0,
                warnings: Vec::new(),
                cancelled: false,
            };
        }

        let outcome = self.search_loop().run(question, now, k, cancel).await;
        self.cache.put(&normalized, &outcome.answer).await;
        outcome.answer
    }

    /// One executor round plus consensus, without refinement or escalation.
    pub async fn search_once(
        &self,
        question: &str,
        now: DateTime<Utc>,
        k: usize,
        cancel: &CancelToken,
    ) -> SearchResponse {
        let query = Arc::new(self.analyzer.analyze(question, now));
        let ctx = Arc::new(SharedContext::new());
        let executor = self.executor();
        let round = executor.execute(&query, k, &ctx, cancel).await;
        let ranked = consensus::merge(&round, k);
        consensus::to_response(&round, ranked)
    }

    /// Corpus statistics straight from the store.
    ///
    /// # Errors
    ///
    /// Returns storage errors from the scan.
    pub async fn stats(&self) -> Result<CorpusStats> {
        self.store.stats().await
    }

    /// Vector-index metadata (dimension, dimension-fix flag, generation)
    /// plus the lexical generation.
    #[must_use]
    pub fn index_metadata(&self) -> (IndexMetadata, u64) {
        (self.vector.metadata(), self.lexical.generation())
    }

    fn executor(&self) -> ParallelExecutor {
        let strategies = default_strategies(
            Arc::clone(&self.lexical),
            Arc::clone(&self.vector),
            Arc::clone(&self.encoder),
            Arc::clone(&self.config),
        );
        ParallelExecutor::new(strategies, Arc::clone(&self.config))
    }

    fn search_loop(&self) -> IterativeSearchLoop {
        let mut looper =
            IterativeSearchLoop::new(self.executor(), Arc::clone(&self.config));
        if let Some(reasoner) = &self.reasoner {
            looper = looper.with_reasoner(Arc::clone(reasoner));
        }
        if let Some(root) = &self.session_root {
            looper = looper.with_session_root(root.clone());
        }
        looper
    }
}
