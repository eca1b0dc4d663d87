//! LLM provider trait for generating answers

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::error::Result;

use super::stream::TokenStream;

/// Trait for LLM-based answer generation from a fully built prompt
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (llama3.2, phi3, etc.)
/// - `GeminiLlm`: Google Generative Language API (gemini-2.5-flash)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate a completion as it is produced.
    ///
    /// The default yields the whole `generate` result as a single fragment.
    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        let text = self.generate(prompt).await?;
        Ok(stream::once(async move { Ok(text) }).boxed())
    }

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
