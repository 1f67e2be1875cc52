//! Transcript chunking for vector indexing
//!
//! Chunks are runs of whitespace-delimited tokens with a fixed overlap so
//! that meaning crossing a chunk boundary stays retrievable. Each chunk is
//! prefixed with a synthesised context header (date, title, speakers) before
//! embedding, so semantic proximity reflects situational context and not
//! just the words in the slice.

use crate::store::format::extract_speakers;
use crate::types::{Chunk, Recording};

/// Chunking parameters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    /// Target tokens per chunk
    pub target_tokens: usize,
    /// Tokens shared between consecutive chunks
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        use crate::constants::defaults;
        Self {
            target_tokens: defaults::CHUNK_TARGET_TOKENS,
            overlap_tokens: (defaults::CHUNK_TARGET_TOKENS as f32 * defaults::CHUNK_OVERLAP_RATIO)
                as usize,
        }
    }
}

impl ChunkerConfig {
    /// Step between chunk starts, always at least one token
    #[must_use]
    pub fn step(&self) -> usize {
        self.target_tokens.saturating_sub(self.overlap_tokens).max(1)
    }
}

/// The context header prepended to every chunk of a recording.
#[must_use]
pub fn context_header(recording: &Recording) -> String {
    let speakers = extract_speakers(&recording.text);
    let speaker_list = if speakers.is_empty() {
        "unknown".to_string()
    } else {
        speakers.join(", ")
    };
    format!(
        "Date: {}. Topic: {}. Speakers: {}\n\n",
        recording.date(),
        recording.title,
        speaker_list
    )
}

/// Slice a recording into overlapping chunks.
///
/// An empty transcript yields no chunks. Offsets are character offsets into
/// the recording text, so a chunk can always be re-read from the body.
#[must_use]
pub fn chunk_recording(recording: &Recording, config: &ChunkerConfig) -> Vec<Chunk> {
    let words = word_spans(&recording.text);
    if words.is_empty() {
        return Vec::new();
    }

    let header = context_header(recording);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + config.target_tokens).min(words.len());
        let start_offset = words[start].0;
        let end_offset = words[end - 1].0 + words[end - 1].1;
        chunks.push(Chunk {
            recording_id: recording.id.clone(),
            chunk_index: chunks.len(),
            start_offset,
            end_offset,
            text: recording.text[start_offset..end_offset].to_string(),
            header: header.clone(),
        });
        if end == words.len() {
            break;
        }
        start += config.step();
    }
    chunks
}

/// (offset, len) spans of whitespace-delimited words.
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i - s));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len() - s));
    }
    spans
}
