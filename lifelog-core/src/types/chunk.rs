//! Chunk types for vector indexing

use serde::{Deserialize, Serialize};

/// A contiguous slice of a recording, the unit of embedding.
///
/// Consecutive chunks overlap by a configurable number of tokens so that
/// semantics crossing a chunk boundary stay retrievable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning recording id
    pub recording_id: String,
    /// Position of this chunk within the recording, starting at 0
    pub chunk_index: usize,
    /// Character offset of the slice start in the recording text
    pub start_offset: usize,
    /// Character offset one past the slice end
    pub end_offset: usize,
    /// The sliced transcript text
    pub text: String,
    /// Synthesised context header (date, title, speakers) prepended before
    /// embedding so proximity reflects situational context
    pub header: String,
}

impl Chunk {
    /// The text actually handed to the encoder: header + body.
    #[must_use]
    pub fn embedding_input(&self) -> String {
        format!("{}{}", self.header, self.text)
    }

    /// Lightweight reference for search results
    #[must_use]
    pub fn chunk_ref(&self) -> ChunkRef {
        ChunkRef {
            chunk_index: self.chunk_index,
            start_offset: self.start_offset,
            end_offset: self.end_offset,
        }
    }
}

/// Reference to a chunk inside its recording, carried on search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Position of the chunk within the recording
    pub chunk_index: usize,
    /// Character offset of the slice start
    pub start_offset: usize,
    /// Character offset one past the slice end
    pub end_offset: usize,
}

/// One embedded chunk as persisted in the `.vec` sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEmbedding {
    /// Position of the chunk within the recording
    pub chunk_index: usize,
    /// Character offset of the slice start
    pub start_offset: usize,
    /// Character offset one past the slice end
    pub end_offset: usize,
    /// The embedding, exactly the corpus dimension long
    pub vector: Vec<f32>,
}
