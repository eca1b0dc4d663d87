//! Provider abstractions for embeddings and LLM
//!
//! Both traits have an Ollama (local) and a Gemini (hosted) implementation.
//! Providers are built once at start-up and shared through `Arc`.

pub mod embedding;
pub mod gemini;
pub mod llm;
pub mod ollama;
pub mod retry;
pub mod stream;

use std::sync::Arc;

pub use embedding::EmbeddingProvider;
pub use gemini::{GeminiEmbedder, GeminiLlm};
pub use llm::LlmProvider;
pub use ollama::{OllamaEmbedder, OllamaLlm};
pub use retry::{retry_request, RetryPolicy, RetryingEmbedder};
pub use stream::TokenStream;

use crate::config::{BackendProvider, RagConfig};
use crate::error::Result;

/// Build the configured embedding provider, wrapped in the retry policy
pub fn build_embedder(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let policy = RetryPolicy::from_config(&config.retry);

    let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.backend {
        BackendProvider::Ollama => Arc::new(RetryingEmbedder::new(
            OllamaEmbedder::new(&config.embeddings)?,
            policy,
        )),
        BackendProvider::Gemini => Arc::new(RetryingEmbedder::new(
            GeminiEmbedder::new(&config.embeddings)?,
            policy,
        )),
    };

    tracing::info!(
        provider = embedder.name(),
        model = %config.embeddings.model,
        dimensions = embedder.dimensions(),
        "Embedding provider ready"
    );
    Ok(embedder)
}

/// Build the configured LLM provider
pub fn build_llm(config: &RagConfig) -> Result<Arc<dyn LlmProvider>> {
    // Generation failures fall back to an apology, never to a zero vector
    let policy = RetryPolicy {
        zero_fallback: false,
        ..RetryPolicy::from_config(&config.retry)
    };

    let llm: Arc<dyn LlmProvider> = match config.llm.backend {
        BackendProvider::Ollama => Arc::new(OllamaLlm::new(&config.llm, policy)?),
        BackendProvider::Gemini => Arc::new(GeminiLlm::new(&config.llm, policy)?),
    };

    tracing::info!(provider = llm.name(), model = llm.model(), "LLM provider ready");
    Ok(llm)
}
