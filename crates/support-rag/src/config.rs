//! Configuration for the support RAG system

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main RAG system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Display name used by the CLI banner
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Retry policy for embedding calls
    #[serde(default)]
    pub retry: RetryConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Conversation history configuration
    #[serde(default)]
    pub conversation: ConversationConfig,
}

fn default_app_name() -> String {
    "Smart Home Support Chatbot".to_string()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            paths: PathsConfig::default(),
            embeddings: EmbeddingConfig::default(),
            retry: RetryConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            conversation: ConversationConfig::default(),
        }
    }
}

impl RagConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str::<RagConfig>(&raw).map_err(|e| {
                    Error::config(format!("invalid config file {}: {}", path.display(), e))
                })?
            }
            None => RagConfig::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from well-known environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from a key lookup (environment in production, a map in tests)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHUNK_SIZE") {
            self.chunking.chunk_size = parse_env("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("CHUNK_OVERLAP") {
            self.chunking.overlap = parse_env("CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("TOP_K_RESULTS") {
            self.retrieval.top_k = parse_env("TOP_K_RESULTS", &v)?;
        }
        if let Some(v) = lookup("INDEX_DIR").or_else(|| lookup("FAISS_INDEX_PATH")) {
            self.paths.index_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("KB_FILE") {
            self.paths.knowledge_base = PathBuf::from(v);
        }
        if let Some(v) = lookup("EMBEDDING_BACKEND") {
            self.embeddings.backend = parse_backend(&v)?;
        }
        match lookup("EMBEDDING_MODEL") {
            Some(v) => self.embeddings.model = v,
            None => self.embeddings.align_model(),
        }
        if let Some(v) = lookup("EMBEDDING_REQUEST_DELAY_MS") {
            self.embeddings.request_delay_ms = Some(parse_env("EMBEDDING_REQUEST_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("LLM_BACKEND") {
            self.llm.backend = parse_backend(&v)?;
        }
        match lookup("GEMINI_MODEL").or_else(|| lookup("LLM_MODEL")) {
            Some(v) => self.llm.model = v,
            None => self.llm.align_model(),
        }
        if let Some(v) = lookup("GOOGLE_API_KEY") {
            self.embeddings.api_key = Some(v.clone());
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("OLLAMA_BASE_URL") {
            self.embeddings.base_url = v.clone();
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("MAX_TOKENS") {
            self.llm.max_tokens = parse_env("MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("TEMPERATURE") {
            self.llm.temperature = parse_env("TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("APP_NAME") {
            self.app_name = v;
        }
        Ok(())
    }

    /// Reject settings that would make chunking or search ill-defined
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.embeddings.dimensions == 0 {
            return Err(Error::config("embedding dimensions must be positive"));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::config("top_k must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if !self.embeddings.backend.fits_embedding_model(&self.embeddings.model) {
            return Err(Error::config(format!(
                "embedding model {:?} cannot be served by the {} backend",
                self.embeddings.model, self.embeddings.backend
            )));
        }
        if !self.llm.backend.fits_llm_model(&self.llm.model) {
            return Err(Error::config(format!(
                "LLM model {:?} cannot be served by the {} backend",
                self.llm.model, self.llm.backend
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} has an invalid value: {:?}", key, value)))
}

fn parse_backend(value: &str) -> Result<BackendProvider> {
    match value.trim().to_lowercase().as_str() {
        "ollama" | "local" => Ok(BackendProvider::Ollama),
        "gemini" | "google" => Ok(BackendProvider::Gemini),
        other => Err(Error::config(format!("unknown backend: {}", other))),
    }
}

/// Backend provider selection for embeddings and generation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Local Ollama server
    #[default]
    Ollama,
    /// Google Gemini API (API key required)
    Gemini,
}

impl BackendProvider {
    const ALL: [BackendProvider; 2] = [BackendProvider::Ollama, BackendProvider::Gemini];

    pub fn default_embedding_model(self) -> &'static str {
        match self {
            BackendProvider::Ollama => "nomic-embed-text",
            BackendProvider::Gemini => "models/text-embedding-004",
        }
    }

    pub fn default_llm_model(self) -> &'static str {
        match self {
            BackendProvider::Ollama => "llama3.2:3b",
            BackendProvider::Gemini => "gemini-2.0-flash-exp",
        }
    }

    /// Pause between embedding requests when none is configured
    pub fn default_request_delay_ms(self) -> u64 {
        match self {
            BackendProvider::Ollama => 0,
            // Free-tier Gemini quotas
            BackendProvider::Gemini => 2_000,
        }
    }

    pub fn fits_embedding_model(self, model: &str) -> bool {
        match self {
            BackendProvider::Ollama => !is_gemini_name(model),
            BackendProvider::Gemini => {
                let name = model.trim_start_matches("models/");
                ["text-embedding", "embedding", "gemini-embedding"]
                    .iter()
                    .any(|prefix| name.starts_with(prefix))
            }
        }
    }

    pub fn fits_llm_model(self, model: &str) -> bool {
        match self {
            BackendProvider::Ollama => !is_gemini_name(model),
            BackendProvider::Gemini => {
                let name = model.trim_start_matches("models/");
                name.starts_with("gemini") || name.starts_with("gemma")
            }
        }
    }
}

impl std::fmt::Display for BackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendProvider::Ollama => write!(f, "ollama"),
            BackendProvider::Gemini => write!(f, "gemini"),
        }
    }
}

/// Names only the Generative Language API understands
fn is_gemini_name(model: &str) -> bool {
    model.starts_with("models/") || model.starts_with("gemini")
}

/// Knowledge-base and artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Raw knowledge-base text file
    pub knowledge_base: PathBuf,
    /// Processed chunks written during the index build
    pub chunks_file: PathBuf,
    /// Directory holding the paired index artifacts
    pub index_dir: PathBuf,
    /// Evaluation report destination
    pub eval_report: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let data = PathBuf::from("data");
        Self {
            knowledge_base: data.join("raw").join("kb.txt"),
            chunks_file: data.join("processed").join("chunks.json"),
            index_dir: data.join("vector_store").join("index"),
            eval_report: PathBuf::from("evaluation_results.json"),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which backend computes embeddings
    pub backend: BackendProvider,
    /// Model name (backend specific)
    pub model: String,
    /// Embedding dimensions; every stored vector must match
    pub dimensions: usize,
    /// Texts embedded per progress step during index builds
    pub batch_size: usize,
    /// Pause between embedding requests in milliseconds; backend default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    /// Ollama base URL
    pub base_url: String,
    /// API key for hosted backends
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: BackendProvider::Ollama,
            model: BackendProvider::Ollama.default_embedding_model().to_string(),
            dimensions: 768,
            batch_size: 5,
            request_delay_ms: None,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl EmbeddingConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(
            self.request_delay_ms
                .unwrap_or_else(|| self.backend.default_request_delay_ms()),
        )
    }

    /// Swap another backend's default model for this backend's default
    fn align_model(&mut self) {
        if !self.backend.fits_embedding_model(&self.model)
            && BackendProvider::ALL.iter().any(|b| b.default_embedding_model() == self.model)
        {
            self.model = self.backend.default_embedding_model().to_string();
        }
    }
}

/// Retry policy for transient embedding failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per text, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Factor applied to the delay after each failed attempt
    pub multiplier: u32,
    /// Substitute a zero vector once attempts are exhausted
    pub zero_fallback: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            multiplier: 2,
            zero_fallback: true,
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows
    pub overlap: usize,
    /// How far back from a raw cut to look for a sentence terminal
    pub sentence_lookback: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
            sentence_lookback: 100,
        }
    }
}

impl ChunkingConfig {
    /// Reject window settings that cannot make forward progress
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be positive"));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved per query
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which backend generates answers
    pub backend: BackendProvider,
    /// Generation model name
    pub model: String,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Ollama base URL
    pub base_url: String,
    /// API key for hosted backends
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: BackendProvider::Ollama,
            model: BackendProvider::Ollama.default_llm_model().to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    /// Swap another backend's default model for this backend's default
    fn align_model(&mut self) {
        if !self.backend.fits_llm_model(&self.model)
            && BackendProvider::ALL.iter().any(|b| b.default_llm_model() == self.model)
        {
            self.model = self.backend.default_llm_model().to_string();
        }
    }
}

/// Conversation history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Messages kept in the rolling history (user and assistant turns)
    pub max_history: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self { max_history: 10 }
    }
}

impl RetryConfig {
    /// Delay before the first retry
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}
