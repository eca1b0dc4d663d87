//! support-rag: retrieval core and answer pipeline for a customer-support chatbot
//!
//! A plain-text knowledge base is normalized, split into section-aware overlapping
//! chunks, embedded, and stored in an exact cosine-similarity index persisted as a
//! pair of artifacts. Queries are embedded, matched against the index, and the top
//! chunks are rendered into a grounded prompt for an LLM.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod generation;
pub mod indexer;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use indexer::{BuildReport, IndexBuilder};
pub use ingestion::{DocumentChunker, TextNormalizer};
pub use pipeline::{PipelineStats, QueryOutcome, RagPipeline};
pub use retrieval::{ContextRetriever, VectorIndex};
pub use types::{Chunk, IndexStats, SearchResult};
