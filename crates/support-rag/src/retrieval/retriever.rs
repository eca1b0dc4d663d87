//! Query-embedding to ranked chunks, and chunks to prompt context

use std::sync::Arc;

use crate::error::Result;
use crate::types::{Chunk, SearchResult};

use super::index::VectorIndex;

/// Stateless bridge between a query embedding and the shared index
#[derive(Debug, Clone)]
pub struct ContextRetriever {
    index: Arc<VectorIndex>,
}

impl ContextRetriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    /// Ranked chunks without scores
    pub fn retrieve(&self, query_embedding: &[f32], k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_with_scores(query_embedding, k)?
            .into_iter()
            .map(|result| result.chunk)
            .collect())
    }

    /// Ranked chunks with their similarity scores, best first
    pub fn retrieve_with_scores(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let results = self.index.search(query_embedding, k)?;
        tracing::debug!(requested = k, returned = results.len(), "Retrieved context");
        Ok(results)
    }

    /// Render chunks in input order as labeled context blocks
    pub fn format_context(chunks: &[Chunk]) -> String {
        format_context(chunks)
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }
}

/// Render chunks as numbered blocks separated by blank lines.
///
/// ```text
/// [Context 1]
/// Section: Section 2: Returns
/// Items may be returned within 30 days.
///
/// [Context 2]
/// ...
/// ```
pub fn format_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "[Context {}]\nSection: {}\n{}\n",
                i + 1,
                chunk.section,
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
