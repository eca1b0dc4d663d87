//! Chunk and search result types

use serde::{Deserialize, Serialize};

/// Section label used when the knowledge base carries no section headings
pub const GENERAL_SECTION: &str = "General";

/// A retrievable unit of knowledge-base text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential ID assigned in emission order (stable within one build only)
    pub chunk_id: u32,
    /// Trimmed text content, an independent copy of the source span
    pub text: String,
    /// Heading line of the owning section, or `General`
    pub section: String,
    /// Position within the owning section
    pub chunk_index: u32,
    /// Character count of `text`
    pub char_count: usize,
    /// Character offset of the source window in the normalized document
    #[serde(default)]
    pub char_start: usize,
    /// End (exclusive) of the source window in the normalized document
    #[serde(default)]
    pub char_end: usize,
}

impl Chunk {
    /// Create a new chunk; `char_count` is derived from `text`
    pub fn new(
        chunk_id: u32,
        text: String,
        section: String,
        chunk_index: u32,
        char_start: usize,
        char_end: usize,
    ) -> Self {
        let char_count = text.chars().count();
        Self {
            chunk_id,
            text,
            section,
            chunk_index,
            char_count,
            char_start,
            char_end,
        }
    }
}

/// A chunk paired with its raw inner-product score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Inner product of unit vectors, in [-1, 1]
    pub score: f32,
}

/// Diagnostic index counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_vectors: usize,
    pub dimension: usize,
    pub total_chunks: usize,
}
