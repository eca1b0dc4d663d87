//! Google Gemini providers (Generative Language API)

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;
use super::llm::LlmProvider;
use super::ollama::status_error;
use super::retry::{retry_request, RetryPolicy};
use super::stream::{lines, TokenStream};

/// Generative Language API root
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

/// Text fragment carried by one server-sent event line, if any
fn sse_token(line: &str) -> Option<Result<String>> {
    let data = line.strip_prefix("data:")?.trim();
    match serde_json::from_str::<GenerateContentResponse>(data) {
        Ok(chunk) => chunk.text().map(Ok),
        Err(e) => Some(Err(Error::llm(format!("Malformed stream event: {}", e)))),
    }
}

fn require_key(api_key: &Option<String>) -> Result<String> {
    api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| Error::config("GOOGLE_API_KEY is required for the gemini backend"))
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::config(format!("Failed to create HTTP client: {}", e)))
}

async fn model_health(client: &Client, api_key: &str, model: &str) -> Result<bool> {
    let url = format!("{}/models/{}", GEMINI_API_BASE, model);
    match client.get(&url).header(API_KEY_HEADER, api_key).send().await {
        Ok(response) => Ok(response.status().is_success()),
        Err(_) => Ok(false),
    }
}

/// Gemini embedding provider (text-embedding-004)
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: require_key(&config.api_key)?,
            model: config.model.trim_start_matches("models/").to_string(),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/models/{}:embedContent", GEMINI_API_BASE, self.model);
        let request = EmbedContentRequest {
            model: format!("models/{}", self.model),
            content: Content {
                role: None,
                parts: vec![Part { text: text.to_string() }],
            },
        };

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body, "Embedding failed", Error::Embedding));
        }

        let parsed: EmbedContentResponse = response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))?;

        Ok(parsed.embedding.values)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn health_check(&self) -> Result<bool> {
        model_health(&self.client, &self.api_key, &self.model).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Gemini LLM provider for answer generation
pub struct GeminiLlm {
    client: Client,
    api_key: String,
    model: String,
    generation: LlmSampling,
    retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy)]
struct LlmSampling {
    temperature: f32,
    max_tokens: u32,
}

impl GeminiLlm {
    pub const TOP_P: f32 = 0.95;
    pub const TOP_K: u32 = 40;

    pub fn new(config: &LlmConfig, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: require_key(&config.api_key)?,
            model: config.model.trim_start_matches("models/").to_string(),
            generation: LlmSampling {
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            retry,
        })
    }

    fn request(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                temperature: self.generation.temperature,
                max_output_tokens: self.generation.max_tokens,
                top_p: Self::TOP_P,
                top_k: Self::TOP_K,
            },
        }
    }

    /// POST to a model method (`generateContent` or `streamGenerateContent?alt=sse`)
    async fn send(&self, method: &str, request: &GenerateContentRequest) -> Result<reqwest::Response> {
        let url = format!("{}/models/{}:{}", GEMINI_API_BASE, self.model, method);

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body, "Generation failed", Error::Llm));
        }
        Ok(response)
    }

    async fn generate_once(&self, request: &GenerateContentRequest) -> Result<String> {
        let response = self.send("generateContent", request).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| Error::llm(format!("Failed to parse generation response: {}", e)))?;

        parsed
            .text()
            .ok_or_else(|| Error::llm("Unexpected response format: no candidate text"))
    }
}

#[async_trait]
impl LlmProvider for GeminiLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        tracing::info!("Generating answer with model: {}", self.model);
        let request = self.request(prompt);
        retry_request(&self.retry, "Generation", || self.generate_once(&request)).await
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TokenStream> {
        tracing::info!("Streaming answer with model: {}", self.model);
        let request = self.request(prompt);
        let response = retry_request(&self.retry, "Streaming generation", || {
            self.send("streamGenerateContent?alt=sse", &request)
        })
        .await?;

        let tokens = lines(response.bytes_stream().boxed()).filter_map(|line| async move {
            match line {
                Ok(line) => sse_token(&line),
                Err(e) => Some(Err(e)),
            }
        });
        Ok(tokens.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        model_health(&self.client, &self.api_key, &self.model).await
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
