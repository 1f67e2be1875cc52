//! Lexical inverted index with BM25 scoring
//!
//! Keyword, phrase and heading matching over the whole corpus. Posting lists
//! are keyed by lowercased, punctuation-stripped stems and hold term
//! frequency plus token positions, so phrase detection works directly on the
//! postings. Titles and headings are indexed into a separate field with a
//! higher default weight.
//!
//! Scoring combines per-term BM25 (k1 = 1.2, b = 0.75) with a 3x phrase
//! boost and a 2x title/heading field boost, then normalises to [0, 1] via
//! `s / (s + c)`. The constant `c` is derived per query so a single strong
//! term match lands at roughly 0.7 instead of everything saturating at 1.0.

use crate::constants::defaults;
use crate::search::context::{ContextSnapshot, SharedContext};
use crate::text::{self, Token};
use crate::types::{
    result_ordering, AnalyzedQuery, HighlightSpan, Recording, SearchResult, StrategyKind,
};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// How many top results feed the shared context after a search.
const CONTEXT_FEEDBACK_K: usize = 5;
/// How many salient terms each top document contributes to the context.
const SALIENT_TERMS_PER_DOC: usize = 4;
/// Jaro-Winkler threshold for mapping context terms onto index vocabulary.
const FUZZY_VOCAB_THRESHOLD: f64 = 0.92;
/// Expansion terms score at a fraction of an original term's weight.
const EXPANSION_TERM_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
struct Posting {
    doc: u32,
    tf: u32,
    /// Token positions (stopwords keep their slots, so adjacency survives)
    positions: Vec<u32>,
    /// Character spans of the matched tokens, for highlights
    spans: Vec<(u32, u32)>,
}

#[derive(Debug, Clone)]
struct DocEntry {
    id: String,
    start_time: DateTime<Utc>,
    date: NaiveDate,
    body_len: u32,
    /// Pre-extracted salient stems, fed back into the shared context
    keywords: Vec<String>,
}

#[derive(Debug, Default)]
struct IndexInner {
    docs: Vec<DocEntry>,
    doc_ids: HashMap<String, u32>,
    body: HashMap<String, Vec<Posting>>,
    field: HashMap<String, Vec<Posting>>,
    total_body_len: u64,
    generation: u64,
}

/// BM25 parameters, tunable per index.
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f32,
    /// Document-length normalisation
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: defaults::BM25_K1,
            b: defaults::BM25_B,
        }
    }
}

/// Token/phrase inverted index over the corpus.
#[derive(Debug, Default)]
pub struct LexicalIndex {
    inner: RwLock<IndexInner>,
    params: Bm25Params,
}

impl LexicalIndex {
    /// Create an empty index with default BM25 parameters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index with custom BM25 parameters
    #[must_use]
    pub fn with_params(params: Bm25Params) -> Self {
        Self {
            inner: RwLock::default(),
            params,
        }
    }

    /// Index a batch of recordings; the batch becomes visible atomically.
    ///
    /// Recordings already present are skipped (the index is append-only;
    /// a rebuild goes through [`LexicalIndex::clear`]).
    pub fn add_batch(&self, recordings: &[Recording]) {
        if recordings.is_empty() {
            return;
        }
        let mut inner = self.inner.write();
        for recording in recordings {
            if inner.doc_ids.contains_key(&recording.id) {
                continue;
            }
            Self::add_locked(&mut inner, recording);
        }
        inner.generation += 1;
        debug!(
            docs = inner.docs.len(),
            generation = inner.generation,
            "lexical batch committed"
        );
    }

    /// Monotonically increasing generation; bumps on every committed batch
    /// and on reset, so consumers can detect both growth and rebuilds.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    /// Number of indexed recordings
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    /// True when nothing is indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().docs.is_empty()
    }

    /// Drop everything, keeping the generation counter moving forward.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let generation = inner.generation + 1;
        *inner = IndexInner {
            generation,
            ..IndexInner::default()
        };
    }

    /// Search the index.
    ///
    /// Terms discovered in `snapshot` (taken at the start of the round, so
    /// every strategy in a round sees the same state) expand the query
    /// additively, never replacing the user's own terms, at reduced weight.
    /// The top results feed their ids, dates and salient terms back into the
    /// live context for the next round. An empty query returns an empty
    /// list; this operation never fails.
    #[must_use]
    pub fn search(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
    ) -> Vec<SearchResult> {
        self.search_filtered(query, k, ctx, snapshot, None)
    }

    /// Search restricted to an inclusive date range.
    ///
    /// With a range but no usable terms, the recordings in the range are
    /// returned with a flat mid score so a purely temporal query still
    /// surfaces its days.
    #[must_use]
    pub fn search_filtered(
        &self,
        query: &AnalyzedQuery,
        k: usize,
        ctx: &SharedContext,
        snapshot: &ContextSnapshot,
        range: Option<(NaiveDate, NaiveDate)>,
    ) -> Vec<SearchResult> {
        if k == 0 {
            return Vec::new();
        }
        let inner = self.inner.read();
        if inner.docs.is_empty() {
            return Vec::new();
        }
        if query.is_empty() {
            let Some((from, to)) = range else {
                return Vec::new();
            };
            let mut results: Vec<SearchResult> = inner
                .docs
                .iter()
                .filter(|doc| doc.date >= from && doc.date <= to)
                .map(|doc| {
                    SearchResult::new(doc.id.clone(), 0.6, StrategyKind::Lexical, doc.start_time)
                })
                .collect();
            results.sort_by(result_ordering);
            results.truncate(k);
            return results;
        }

        let mut terms: Vec<(String, f32)> = query
            .terms
            .iter()
            .map(|t| (t.clone(), 1.0))
            .collect();
        for expansion in Self::expansion_terms(&inner, query, snapshot) {
            terms.push((expansion, EXPANSION_TERM_WEIGHT));
        }

        let mut scores: HashMap<u32, f32> = HashMap::new();
        let mut spans: HashMap<u32, Vec<HighlightSpan>> = HashMap::new();
        let avgdl = inner.total_body_len as f32 / inner.docs.len() as f32;

        for (term, weight) in &terms {
            if let Some(postings) = inner.body.get(term) {
                let idf = idf(inner.docs.len(), postings.len());
                for posting in postings {
                    let doc = &inner.docs[posting.doc as usize];
                    let tf_norm = tf_component(posting.tf, doc.body_len, avgdl, self.params);
                    *scores.entry(posting.doc).or_insert(0.0) += weight * idf * tf_norm;
                    let doc_spans = spans.entry(posting.doc).or_default();
                    doc_spans.extend(posting.spans.iter().map(|&(offset, len)| HighlightSpan {
                        offset: offset as usize,
                        len: len as usize,
                    }));
                }
            }
            if let Some(postings) = inner.field.get(term) {
                let idf = idf(inner.docs.len(), postings.len());
                for posting in postings {
                    // Title/heading fields are short; a fixed pseudo-length
                    // keeps their BM25 term component comparable across docs.
                    let tf_norm = tf_component(posting.tf, 8, 8.0, self.params);
                    *scores.entry(posting.doc).or_insert(0.0) +=
                        weight * defaults::FIELD_BOOST * idf * tf_norm;
                }
            }
        }

        // Phrase boost: any contiguous query phrase matching a document
        // multiplies that document's raw score, once per document no matter
        // how many phrases hit.
        let mut phrase_docs: BTreeSet<u32> = BTreeSet::new();
        for phrase in &query.phrases {
            if phrase.len() >= 2 {
                phrase_docs.extend(Self::docs_matching_phrase(&inner, phrase));
            }
        }
        for doc in phrase_docs {
            if let Some(score) = scores.get_mut(&doc) {
                *score *= defaults::PHRASE_BOOST;
            }
        }

        // Normalisation constant: a lone strong term match (saturated tf,
        // average idf across the query terms) should land near 0.7.
        let mean_idf = terms
            .iter()
            .map(|(t, _)| idf(inner.docs.len(), inner.body.get(t).map_or(0, Vec::len)))
            .sum::<f32>()
            / terms.len() as f32;
        let strong = (mean_idf * (self.params.k1 + 1.0)).max(f32::EPSILON);
        let c = strong * (1.0 - defaults::STRONG_MATCH_TARGET) / defaults::STRONG_MATCH_TARGET;

        let mut results: Vec<SearchResult> = scores
            .into_iter()
            .filter(|(doc_idx, _)| {
                let doc = &inner.docs[*doc_idx as usize];
                range.is_none_or(|(from, to)| doc.date >= from && doc.date <= to)
            })
            .map(|(doc_idx, raw)| {
                let doc = &inner.docs[doc_idx as usize];
                let mut doc_spans = spans.remove(&doc_idx).unwrap_or_default();
                doc_spans.sort_unstable();
                doc_spans.dedup();
                SearchResult::new(
                    doc.id.clone(),
                    raw / (raw + c),
                    StrategyKind::Lexical,
                    doc.start_time,
                )
                .with_spans(doc_spans)
            })
            .collect();
        results.sort_by(result_ordering);
        results.truncate(k);

        Self::feed_context(&inner, &results, ctx);
        results
    }

    /// Vocabulary size, exposed for diagnostics
    #[must_use]
    pub fn vocabulary_len(&self) -> usize {
        self.inner.read().body.len()
    }

    fn add_locked(inner: &mut IndexInner, recording: &Recording) {
        let doc = inner.docs.len() as u32;
        let body_tokens = text::tokenize(&recording.text);

        let mut field_text = recording.title.clone();
        for heading in &recording.headings {
            field_text.push('\n');
            field_text.push_str(heading);
        }
        let field_tokens = text::tokenize(&field_text);

        inner.docs.push(DocEntry {
            id: recording.id.clone(),
            start_time: recording.start_time,
            date: recording.date(),
            body_len: body_tokens.len() as u32,
            keywords: text::extract_keywords(&recording.text, SALIENT_TERMS_PER_DOC),
        });
        inner.doc_ids.insert(recording.id.clone(), doc);
        inner.total_body_len += body_tokens.len() as u64;

        Self::post_tokens(&mut inner.body, doc, &body_tokens, true);
        Self::post_tokens(&mut inner.field, doc, &field_tokens, false);
    }

    fn post_tokens(
        postings: &mut HashMap<String, Vec<Posting>>,
        doc: u32,
        tokens: &[Token],
        keep_spans: bool,
    ) {
        let mut per_term: HashMap<&str, Posting> = HashMap::new();
        for token in tokens {
            let entry = per_term.entry(token.stem.as_str()).or_insert_with(|| Posting {
                doc,
                tf: 0,
                positions: Vec::new(),
                spans: Vec::new(),
            });
            entry.tf += 1;
            entry.positions.push(token.position as u32);
            if keep_spans {
                entry.spans.push((token.offset as u32, token.len as u32));
            }
        }
        for (stem, posting) in per_term {
            postings.entry(stem.to_string()).or_default().push(posting);
        }
    }

    /// Context terms mapped onto the index vocabulary, fuzzily, minus the
    /// terms the query already has.
    fn expansion_terms(
        inner: &IndexInner,
        query: &AnalyzedQuery,
        snapshot: &ContextSnapshot,
    ) -> Vec<String> {
        let discovered = &snapshot.discovered_terms;
        if discovered.is_empty() {
            return Vec::new();
        }
        let own: BTreeSet<&String> = query.terms.iter().collect();
        let mut expansions = Vec::new();
        for term in discovered {
            if own.contains(term) {
                continue;
            }
            if inner.body.contains_key(term) {
                expansions.push(term.clone());
                continue;
            }
            // Map near-misses (inflection differences, typos) onto the
            // closest vocabulary entry.
            let best = inner
                .body
                .keys()
                .map(|v| (strsim::jaro_winkler(term, v), v))
                .max_by(|a, b| a.0.total_cmp(&b.0));
            if let Some((sim, vocab)) = best {
                if sim >= FUZZY_VOCAB_THRESHOLD {
                    expansions.push(vocab.clone());
                }
            }
        }
        expansions.sort();
        expansions.dedup();
        expansions
    }

    /// Documents whose body contains the phrase terms in order with at most
    /// one intervening token between neighbours (stopwords keep their
    /// position slots, so "went to mimi" still counts as contiguous).
    fn docs_matching_phrase(inner: &IndexInner, phrase: &[String]) -> Vec<u32> {
        let mut candidates: Option<HashMap<u32, Vec<u32>>> = None;
        for term in phrase {
            let Some(postings) = inner.body.get(term) else {
                return Vec::new();
            };
            let positions: HashMap<u32, Vec<u32>> = postings
                .iter()
                .map(|p| (p.doc, p.positions.clone()))
                .collect();
            candidates = Some(match candidates {
                None => positions,
                Some(prev) => {
                    let mut next = HashMap::new();
                    for (doc, anchor_positions) in prev {
                        if let Some(term_positions) = positions.get(&doc) {
                            let advanced: Vec<u32> = anchor_positions
                                .iter()
                                .filter_map(|&a| {
                                    term_positions
                                        .iter()
                                        .find(|&&p| p > a && p - a <= 2)
                                        .copied()
                                })
                                .collect();
                            if !advanced.is_empty() {
                                next.insert(doc, advanced);
                            }
                        }
                    }
                    next
                }
            });
        }
        candidates.map(|c| c.into_keys().collect()).unwrap_or_default()
    }

    fn feed_context(inner: &IndexInner, results: &[SearchResult], ctx: &SharedContext) {
        let top = &results[..results.len().min(CONTEXT_FEEDBACK_K)];
        if top.is_empty() {
            return;
        }
        ctx.add_hot(top.iter().map(|r| r.recording_id.clone()));
        let mut dates = Vec::new();
        let mut terms = Vec::new();
        for result in top {
            if let Some(&doc) = inner.doc_ids.get(&result.recording_id) {
                let entry = &inner.docs[doc as usize];
                dates.push(entry.date);
                terms.extend(entry.keywords.iter().cloned());
            }
        }
        ctx.add_dates(dates);
        ctx.add_terms(terms);
    }
}

/// Lucene-style non-negative idf.
fn idf(doc_count: usize, df: usize) -> f32 {
    let n = doc_count as f32;
    let df = df as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

fn tf_component(tf: u32, doc_len: u32, avgdl: f32, params: Bm25Params) -> f32 {
    let tf = tf as f32;
    let norm = 1.0 - params.b + params.b * (doc_len as f32 / avgdl.max(f32::EPSILON));
    tf * (params.k1 + 1.0) / (tf + params.k1 * norm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryAnalyzer;
    use chrono::TimeZone;

    fn recording(id: &str, title: &str, day: u32, text: &str) -> Recording {
        Recording::new(
            id,
            title,
            Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, day, 10, 0, 0).unwrap(),
            text,
        )
        .unwrap()
    }

    fn analyzed(q: &str) -> AnalyzedQuery {
        QueryAnalyzer::new().analyze(q, Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap())
    }

    fn index_with_corpus() -> LexicalIndex {
        let index = LexicalIndex::new();
        index.add_batch(&[
            recording("rec-a", "Budget review", 3, "we walked through the budget line by line"),
            recording("rec-b", "Standup", 4, "quick sync about the sprint and the demo"),
            recording("rec-c", "Family", 5, "kids went to Mimi's house at 12:30 for lunch"),
            recording("rec-d", "Planning", 6, "budget planning for the next quarter budget"),
        ]);
        index
    }

    #[test]
    fn empty_query_returns_empty() {
        let index = index_with_corpus();
        let ctx = SharedContext::new();
        assert!(index.search(&analyzed(""), 10, &ctx, &ctx.snapshot()).is_empty());
        assert!(index.search(&analyzed("the of and"), 10, &ctx, &ctx.snapshot()).is_empty());
    }

    #[test]
    fn keyword_match_finds_the_right_documents() {
        let index = index_with_corpus();
        let ctx = SharedContext::new();
        let results = index.search(&analyzed("budget"), 10, &ctx, &ctx.snapshot());
        let ids: Vec<&str> = results.iter().map(|r| r.recording_id.as_str()).collect();
        assert!(ids.contains(&"rec-a"));
        assert!(ids.contains(&"rec-d"));
        assert!(!ids.contains(&"rec-b"));
    }

    #[test]
    fn scores_stay_in_unit_interval_without_saturating() {
        let index = index_with_corpus();
        let ctx = SharedContext::new();
        let results = index.search(&analyzed("budget planning quarter"), 10, &ctx, &ctx.snapshot());
        assert!(!results.is_empty());
        for result in &results {
            assert!(result.score > 0.0 && result.score < 1.0);
        }
        // Top score must not be pinned to 1.0 even for the best match
        assert!(results[0].score < 0.999);
    }

    #[test]
    fn phrase_match_outranks_scattered_terms() {
        let index = LexicalIndex::new();
        index.add_batch(&[
            recording("rec-p", "Notes", 3, "the budget meeting ran long today"),
            recording("rec-q", "Notes", 3, "meeting about lunch, then budget talk later"),
        ]);
        let ctx = SharedContext::new();
        let results = index.search(&analyzed("budget meeting"), 10, &ctx, &ctx.snapshot());
        assert_eq!(results[0].recording_id, "rec-p");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn title_hits_outweigh_body_hits() {
        let index = LexicalIndex::new();
        index.add_batch(&[
            recording("rec-t", "Budget review", 3, "nothing relevant here at all"),
            recording("rec-u", "Chat", 3, "a passing mention of budget topics"),
        ]);
        let ctx = SharedContext::new();
        let results = index.search(&analyzed("budget"), 10, &ctx, &ctx.snapshot());
        assert_eq!(results[0].recording_id, "rec-t");
    }

    #[test]
    fn search_feeds_the_shared_context() {
        let index = index_with_corpus();
        let ctx = SharedContext::new();
        let _ = index.search(&analyzed("budget"), 10, &ctx, &ctx.snapshot());
        assert!(!ctx.hot_ids().is_empty());
        assert!(!ctx.dates().is_empty());
        assert!(!ctx.terms().is_empty());
    }

    #[test]
    fn context_terms_expand_additively() {
        let index = index_with_corpus();
        let ctx = SharedContext::new();
        ctx.add_terms(["lunch".to_string()]);
        // The query's own term still matches; the expansion pulls rec-c up too
        let results = index.search(&analyzed("budget"), 10, &ctx, &ctx.snapshot());
        let ids: Vec<&str> = results.iter().map(|r| r.recording_id.as_str()).collect();
        assert!(ids.contains(&"rec-a"));
        assert!(ids.contains(&"rec-c"));
    }

    #[test]
    fn generation_bumps_per_batch_and_on_clear() {
        let index = LexicalIndex::new();
        assert_eq!(index.generation(), 0);
        index.add_batch(&[recording("rec-a", "T", 3, "text")]);
        assert_eq!(index.generation(), 1);
        index.add_batch(&[recording("rec-b", "T", 3, "text")]);
        assert_eq!(index.generation(), 2);
        index.clear();
        assert_eq!(index.generation(), 3);
        assert!(index.is_empty());
    }

    #[test]
    fn duplicate_ids_are_skipped() {
        let index = LexicalIndex::new();
        let r = recording("rec-a", "T", 3, "text");
        index.add_batch(&[r.clone()]);
        index.add_batch(&[r]);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn results_carry_highlight_spans() {
        let index = index_with_corpus();
        let ctx = SharedContext::new();
        let results = index.search(&analyzed("budget"), 10, &ctx, &ctx.snapshot());
        let top = &results[0];
        assert!(!top.highlight_spans.is_empty());
    }

    #[test]
    fn deterministic_ordering_for_equal_scores() {
        let index = LexicalIndex::new();
        index.add_batch(&[
            recording("rec-b", "Same", 3, "identical text"),
            recording("rec-a", "Same", 3, "identical text"),
        ]);
        let ctx = SharedContext::new();
        let results = index.search(&analyzed("identical"), 10, &ctx, &ctx.snapshot());
        assert_eq!(results[0].recording_id, "rec-a");
    }
}
