//! Index-build ingestion: loading, normalization and chunking

mod chunker;
mod loader;
mod normalizer;

pub use chunker::{chunk_document, DocumentChunker, Section, Window};
pub use loader::{load_chunks_json, load_knowledge_base, save_chunks_json};
pub use normalizer::{normalize, TextNormalizer};
