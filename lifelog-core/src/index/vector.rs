//! Dense vector index with hybrid reranking
//!
//! One embedding per chunk, brute-force cosine kNN (fine for corpora up to
//! roughly 1e5 chunks; the contract would admit an ANN backend without API
//! changes). Vectors are unit-normalised on entry so similarity is a dot
//! product.
//!
//! The index is stamped with the corpus dimension at creation. An encoder
//! whose native dimension differs gets the declared dimension-fix: zero-pad
//! when short, truncate when long. That adaptation is lossy and therefore
//! observable through [`IndexMetadata::dimension_padded`], never silent.

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::index::lexical::LexicalIndex;
use crate::capabilities::Encoder;
use crate::search::context::{ContextSnapshot, SharedContext};
use crate::types::{
    result_ordering, AnalyzedQuery, Chunk, ChunkEmbedding, ChunkRef, Recording, SearchResult,
    StrategyKind,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Entries scanned between cancellation polls.
const CANCEL_POLL_STRIDE: usize = 1024;

#[derive(Debug, Clone)]
struct VecEntry {
    recording_id: String,
    chunk: ChunkRef,
    vector: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
struct DocInfo {
    start_time: DateTime<Utc>,
    date: NaiveDate,
}

#[derive(Debug, Default)]
struct VecInner {
    entries: Vec<VecEntry>,
    docs: HashMap<String, DocInfo>,
    dimension_padded: bool,
    generation: u64,
}

/// Observable index state, including the dimension-fix flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMetadata {
    /// Declared corpus dimension
    pub dimension: usize,
    /// True once any vector has been padded or truncated to fit
    pub dimension_padded: bool,
    /// Snapshot generation, bumped per committed batch
    pub generation: u64,
    /// Indexed chunk count
    pub chunks: usize,
    /// Indexed recording count
    pub recordings: usize,
}

/// Embedding store and kNN search over chunks.
#[derive(Debug)]
pub struct VectorIndex {
    inner: RwLock<VecInner>,
    dimension: usize,
    /// When false, a mismatched encoder is a `DimensionMismatch` error
    /// instead of getting the pad/truncate fix.
    dimension_fix: bool,
}

impl VectorIndex {
    /// Create an empty index stamped with the corpus dimension, with the
    /// pad/truncate dimension-fix enabled
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: RwLock::default(),
            dimension,
            dimension_fix: true,
        }
    }

    /// Strict variant: a corpus that declared no dimension-fix contract
    /// fails fast on the first mismatched vector
    #[must_use]
    pub fn strict(dimension: usize) -> Self {
        Self {
            inner: RwLock::default(),
            dimension,
            dimension_fix: false,
        }
    }

    /// Observable metadata
    #[must_use]
    pub fn metadata(&self) -> IndexMetadata {
        let inner = self.inner.read();
        IndexMetadata {
            dimension: self.dimension,
            dimension_padded: inner.dimension_padded,
            generation: inner.generation,
            chunks: inner.entries.len(),
            recordings: inner.docs.len(),
        }
    }

    /// Embed and index a recording's chunks, returning the embeddings for
    /// sidecar persistence. Replaces any earlier entries for the same id, so
    /// re-ingest after a content change is safe.
    ///
    /// # Errors
    ///
    /// Returns `Encoder` when the encoder fails; nothing is committed then.
    pub async fn upsert(
        &self,
        recording: &Recording,
        chunks: &[Chunk],
        encoder: &dyn Encoder,
    ) -> Result<Vec<ChunkEmbedding>> {
        let inputs: Vec<String> = chunks.iter().map(Chunk::embedding_input).collect();
        let vectors = encoder.encode(&inputs).await?;

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(&vectors) {
            embeddings.push(ChunkEmbedding {
                chunk_index: chunk.chunk_index,
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                vector: self.fit_dimension(vector.clone())?,
            });
        }

        self.load(recording, &embeddings)?;
        Ok(embeddings)
    }

    /// Index pre-computed embeddings (the restore-from-sidecar path).
    ///
    /// Vectors are dimension-fixed and unit-normalised on the way in; the
    /// batch becomes visible atomically.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for a mismatched vector on a strict
    /// index; nothing is committed then.
    pub fn load(&self, recording: &Recording, embeddings: &[ChunkEmbedding]) -> Result<()> {
        let mut inner = self.inner.write();
        let mut entries = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            let vector =
                Self::normalize(self.fit_dimension_inner(&mut inner, embedding.vector.clone())?);
            entries.push(VecEntry {
                recording_id: recording.id.clone(),
                chunk: ChunkRef {
                    chunk_index: embedding.chunk_index,
                    start_offset: embedding.start_offset,
                    end_offset: embedding.end_offset,
                },
                vector,
            });
        }
        inner.entries.retain(|e| e.recording_id != recording.id);
        inner.entries.append(&mut entries);
        inner.docs.insert(
            recording.id.clone(),
            DocInfo {
                start_time: recording.start_time,
                date: recording.date(),
            },
        );
        inner.generation += 1;
        debug!(
            id = %recording.id,
            chunks = embeddings.len(),
            generation = inner.generation,
            "vector batch committed"
        );
        Ok(())
    }

    /// kNN search by cosine similarity, one result per recording (best
    /// chunk wins). Candidates on dates discovered in the round-start
    /// snapshot receive a small additive bonus before ranking.
    ///
    /// # Errors
    ///
    /// Returns `Encoder` when query encoding fails.
    pub async fn search(
        &self,
        query_text: &str,
        k: usize,
        date_filter: Option<(NaiveDate, NaiveDate)>,
        snapshot: &ContextSnapshot,
        encoder: &dyn Encoder,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        if query_text.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = encoder.encode(&[query_text.to_string()]).await?;
        let query_vec =
            Self::normalize(self.fit_dimension(query_vec.into_iter().next().unwrap_or_default())?);

        let discovered_dates = &snapshot.discovered_dates;
        let inner = self.inner.read();

        // Best chunk per recording
        let mut best: HashMap<&str, (f32, ChunkRef)> = HashMap::new();
        for (i, entry) in inner.entries.iter().enumerate() {
            if i % CANCEL_POLL_STRIDE == 0 && cancel.is_cancelled() {
                break;
            }
            let Some(doc) = inner.docs.get(&entry.recording_id) else {
                continue;
            };
            if let Some((from, to)) = date_filter {
                if doc.date < from || doc.date > to {
                    continue;
                }
            }
            let cosine: f32 = entry.vector.iter().zip(&query_vec).map(|(a, b)| a * b).sum();
            let mut score = (cosine + 1.0) / 2.0;
            if discovered_dates.contains(&doc.date) {
                score += config.discovered_date_bonus;
            }
            let slot = best.entry(entry.recording_id.as_str()).or_insert((f32::MIN, entry.chunk));
            if score > slot.0 {
                *slot = (score, entry.chunk);
            }
        }

        let mut results: Vec<SearchResult> = best
            .into_iter()
            .map(|(id, (score, chunk))| {
                let doc = inner.docs[id];
                SearchResult::new(id, score, StrategyKind::Vector, doc.start_time).with_chunk(chunk)
            })
            .collect();
        results.sort_by(result_ordering);
        results.truncate(k);
        Ok(results)
    }

    /// BM25 + vector hybrid: union of lexical and vector top-k, rescored as
    /// a weighted sum of the two normalised scores.
    ///
    /// # Errors
    ///
    /// Returns `Encoder` when query encoding fails; a lexical-only result is
    /// not produced here (that is the lexical strategy's job).
    #[allow(clippy::too_many_arguments)]
    pub async fn hybrid_search(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
        encoder: &dyn Encoder,
        lexical: &LexicalIndex,
        config: &EngineConfig,
        cancel: &CancelToken,
    ) -> Result<Vec<SearchResult>> {
        let lexical_results = lexical.search(query, k, ctx, snapshot);
        let vector_results = self
            .search(&query.raw, k, None, snapshot, encoder, config, cancel)
            .await?;

        let w_lex = config.hybrid_lexical_weight;
        let w_vec = config.hybrid_vector_weight();

        struct Merged {
            lex: f32,
            vec: f32,
            spans: Vec<crate::types::HighlightSpan>,
            chunk: Option<ChunkRef>,
            start_time: DateTime<Utc>,
        }
        let mut merged: HashMap<String, Merged> = HashMap::new();
        for r in lexical_results {
            merged.insert(
                r.recording_id.clone(),
                Merged {
                    lex: r.score,
                    vec: 0.0,
                    spans: r.highlight_spans,
                    chunk: None,
                    start_time: r.start_time,
                },
            );
        }
        for r in vector_results {
            let entry = merged.entry(r.recording_id.clone()).or_insert(Merged {
                lex: 0.0,
                vec: 0.0,
                spans: Vec::new(),
                chunk: None,
                start_time: r.start_time,
            });
            entry.vec = r.score;
            entry.chunk = r.chunk_ref;
        }

        let mut results: Vec<SearchResult> = merged
            .into_iter()
            .map(|(id, m)| {
                let mut result = SearchResult::new(
                    id,
                    w_lex * m.lex + w_vec * m.vec,
                    StrategyKind::Hybrid,
                    m.start_time,
                )
                .with_spans(m.spans);
                if let Some(chunk) = m.chunk {
                    result = result.with_chunk(chunk);
                }
                result
            })
            .collect();
        results.sort_by(result_ordering);
        results.truncate(k);
        Ok(results)
    }

    /// Apply the declared dimension-fix to a vector.
    fn fit_dimension(&self, vector: Vec<f32>) -> Result<Vec<f32>> {
        let mut inner = self.inner.write();
        self.fit_dimension_inner(&mut inner, vector)
    }

    fn fit_dimension_inner(&self, inner: &mut VecInner, mut vector: Vec<f32>) -> Result<Vec<f32>> {
        use std::cmp::Ordering;
        if vector.len() != self.dimension && !self.dimension_fix {
            return Err(crate::error::Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        match vector.len().cmp(&self.dimension) {
            Ordering::Equal => Ok(vector),
            Ordering::Less => {
                if !inner.dimension_padded {
                    warn!(
                        native = vector.len(),
                        corpus = self.dimension,
                        "encoder dimension below corpus dimension; zero-padding"
                    );
                }
                inner.dimension_padded = true;
                vector.resize(self.dimension, 0.0);
                Ok(vector)
            }
            Ordering::Greater => {
                if !inner.dimension_padded {
                    warn!(
                        native = vector.len(),
                        corpus = self.dimension,
                        "encoder dimension above corpus dimension; truncating"
                    );
                }
                inner.dimension_padded = true;
                vector.truncate(self.dimension);
                Ok(vector)
            }
        }
    }

    fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}
