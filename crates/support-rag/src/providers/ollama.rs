//! Ollama-based providers for embeddings and LLM

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;
use super::retry::{retry_request, RetryPolicy};
use super::stream::{lines, TokenStream};

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// One NDJSON line of a streamed `/api/generate` reply
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    error: Option<String>,
}

/// Token carried by one streamed line, if any
fn stream_token(line: &str) -> Option<Result<String>> {
    match serde_json::from_str::<StreamChunk>(line) {
        Ok(StreamChunk { error: Some(error), .. }) => Some(Err(Error::llm(error))),
        Ok(chunk) if chunk.response.is_empty() => None,
        Ok(chunk) => Some(Ok(chunk.response)),
        Err(e) => Some(Err(Error::llm(format!("Malformed stream line: {}", e)))),
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(5)
        .build()
        .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))
}

async fn ollama_health(client: &Client, base_url: &str) -> Result<bool> {
    let url = format!("{}/api/tags", base_url);
    match client.get(&url).send().await {
        Ok(response) => Ok(response.status().is_success()),
        Err(_) => Ok(false),
    }
}

/// Map a non-success status to a provider error; 429 and 5xx stay retryable
pub(crate) fn status_error(
    status: reqwest::StatusCode,
    body: String,
    what: &str,
    otherwise: fn(String) -> Error,
) -> Error {
    let message = format!("{}: HTTP {} - {}", what, status, body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        Error::RateLimited(message)
    } else if status.is_server_error() {
        Error::Unavailable(message)
    } else {
        otherwise(message)
    }
}

/// Ollama embedding provider using nomic-embed-text or similar models
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions: config.dimensions,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body, "Embedding failed", Error::Embedding));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))?;

        Ok(embed_response.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        ollama_health(&self.client, &self.base_url).await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama LLM provider for answer generation
pub struct OllamaLlm {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    retry: RetryPolicy,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider
    pub fn new(config: &LlmConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            retry,
        })
    }

    fn request<'a>(&'a self, prompt: &'a str, stream: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        }
    }

    /// POST `/api/generate` and fail on a non-success status
    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.request(prompt, stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body, "Generation failed", Error::Llm));
        }
        Ok(response)
    }

    async fn generate_once(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;

        let generate_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::llm(format!("Failed to parse generation response: {}", e)))?;

        Ok(generate_response.response)
    }
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::info!("Generating answer with model: {}", self.model);
        retry_request(&self.retry, "Generation", || self.generate_once(prompt)).await
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        tracing::info!("Streaming answer with model: {}", self.model);
        let response = retry_request(&self.retry, "Streaming generation", || self.send(prompt, true)).await?;

        let tokens = lines(response.bytes_stream().boxed()).filter_map(|line| async move {
            match line {
                Ok(line) => stream_token(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(tokens.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        ollama_health(&self.client, &self.base_url).await
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_classification() {
        use reqwest::StatusCode;

        let limited = status_error(StatusCode::TOO_MANY_REQUESTS, String::new(), "Embedding failed", Error::Embedding);
        assert!(matches!(limited, Error::RateLimited(_)));

        let busy = status_error(StatusCode::SERVICE_UNAVAILABLE, String::new(), "Generation failed", Error::Llm);
        assert!(matches!(busy, Error::Unavailable(_)));
        assert!(busy.is_retryable());

        let bad = status_error(StatusCode::BAD_REQUEST, "no model".into(), "Embedding failed", Error::Embedding);
        assert!(matches!(bad, Error::Embedding(_)));
        assert!(!bad.is_retryable());

        let bad = status_error(StatusCode::NOT_FOUND, String::new(), "Generation failed", Error::Llm);
        assert!(matches!(bad, Error::Llm(_)));
    }

    #[test]
    fn test_embedder_trims_base_url() {
        let config = EmbeddingConfig {
            base_url: "http://localhost:11434/".into(),
            ..Default::default()
        };
        let embedder = OllamaEmbedder::new(&config).unwrap();
        assert_eq!(embedder.base_url, "http://localhost:11434");
        assert_eq!(embedder.dimensions(), 768);
        assert_eq!(embedder.model(), "nomic-embed-text");
    }

    #[test]
    fn test_generate_request_shape() {
        let llm = OllamaLlm::new(&LlmConfig::default(), RetryPolicy::no_retry()).unwrap();

        let json = serde_json::to_value(llm.request("hello", false)).unwrap();
        assert_eq!(json["model"], "llama3.2:3b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 1024);

        let json = serde_json::to_value(llm.request("hello", true)).unwrap();
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_stream_token_parsing() {
        let token = stream_token(r#"{"model":"llama3.2:3b","response":"Hel","done":false}"#);
        assert_eq!(token.unwrap().unwrap(), "Hel");

        assert!(stream_token(r#"{"response":"","done":true,"eval_count":42}"#).is_none());

        let failed = stream_token(r#"{"error":"model not found"}"#).unwrap();
        assert!(matches!(failed, Err(Error::Llm(m)) if m == "model not found"));

        assert!(matches!(stream_token("not json"), Some(Err(Error::Llm(_)))));
    }

    #[tokio::test]
    async fn test_ndjson_body_becomes_tokens() {
        use futures_util::stream;

        let body: Vec<std::result::Result<&'static str, Error>> = vec![
            Ok("{\"response\":\"Returns \"}\n{\"resp"),
            Ok("onse\":\"take 60 days.\"}\n{\"response\":\"\",\"done\":true}\n"),
        ];
        let tokens: Vec<String> = lines(stream::iter(body))
            .filter_map(|line| async move { line.ok().and_then(|l| stream_token(&l)) })
            .map(|t| t.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["Returns ", "take 60 days."]);
    }
}
