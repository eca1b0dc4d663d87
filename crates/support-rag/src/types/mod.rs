//! Core types for the support RAG system

pub mod chunk;

pub use chunk::{Chunk, IndexStats, SearchResult};
