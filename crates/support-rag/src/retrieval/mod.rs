//! Vector index and context retrieval

mod index;
mod retriever;

pub use index::{VectorIndex, CHUNKS_FILE, VECTORS_FILE};
pub use retriever::{format_context, ContextRetriever};
