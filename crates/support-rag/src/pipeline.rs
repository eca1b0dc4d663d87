//! Query orchestration: embed, retrieve, prompt, generate

use futures_util::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::generation::{ConversationManager, PromptBuilder, QueryKind};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::{format_context, ContextRetriever, VectorIndex};
use crate::types::{Chunk, IndexStats};

/// Response returned when any step of a query fails
pub const APOLOGY_RESPONSE: &str =
    "I apologize, but I encountered an error processing your request.";

/// Result of one query; failures are reported in `error`, never raised
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub query: String,
    pub response: String,
    /// Retrieved chunks, best first
    pub chunks: Vec<Chunk>,
    /// Similarity score of each retrieved chunk
    pub scores: Vec<f32>,
    /// Wall-clock time of the whole query in milliseconds
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Pipeline diagnostics
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineStats {
    pub index: IndexStats,
    pub conversation_length: usize,
}

/// How the prompt for a query is built
#[derive(Debug, Clone, Copy)]
enum PromptMode {
    /// Chat turn; uses the follow-up prompt once history exists and records the turn
    Conversational,
    /// Stateless single question with an optional specialised template
    OneShot(QueryKind),
}

/// Retrieved context and the prompt built from it
struct PreparedQuery {
    chunks: Vec<Chunk>,
    scores: Vec<f32>,
    prompt: String,
}

impl PromptMode {
    fn chat(use_history: bool) -> Self {
        if use_history {
            PromptMode::Conversational
        } else {
            PromptMode::OneShot(QueryKind::General)
        }
    }
}

/// End-to-end support pipeline over a loaded index
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    retriever: ContextRetriever,
    conversation: Mutex<ConversationManager>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        config: &RagConfig,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        tracing::info!(
            top_k = config.retrieval.top_k,
            embedder = embedder.name(),
            llm = llm.name(),
            "RAG pipeline initialized"
        );
        Self {
            embedder,
            llm,
            retriever: ContextRetriever::new(index),
            conversation: Mutex::new(ConversationManager::new(config.conversation.max_history)),
            top_k: config.retrieval.top_k,
        }
    }

    /// Answer a chat turn.
    ///
    /// With `use_history`, the conversation so far is included in the prompt and the
    /// turn is recorded on success. Any failure yields [`APOLOGY_RESPONSE`].
    pub async fn query(&self, user_query: &str, use_history: bool) -> QueryOutcome {
        self.run(user_query, PromptMode::chat(use_history)).await
    }

    /// Answer a chat turn, handing each generated fragment to `on_token` as it arrives.
    ///
    /// Same prompting and history rules as [`RagPipeline::query`]. On failure, including
    /// one part-way through the stream, [`APOLOGY_RESPONSE`] is passed to `on_token` and
    /// becomes the outcome's response.
    pub async fn stream_response<F>(&self, user_query: &str, use_history: bool, mut on_token: F) -> QueryOutcome
    where
        F: FnMut(&str),
    {
        let started = Instant::now();
        tracing::info!("Streaming query: {}", user_query);

        let mode = PromptMode::chat(use_history);
        let mut outcome = match self.stream_answer(user_query, mode, &mut on_token).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error in streaming: {}", e);
                on_token(APOLOGY_RESPONSE);
                Self::failed(user_query, e)
            }
        };
        outcome.latency_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    /// Answer a single question without touching the conversation
    pub async fn ask(&self, user_query: &str, kind: QueryKind) -> QueryOutcome {
        self.run(user_query, PromptMode::OneShot(kind)).await
    }

    pub fn clear_history(&self) {
        self.conversation.lock().clear();
        tracing::info!("Conversation history cleared");
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            index: self.retriever.index().stats(),
            conversation_length: self.conversation.lock().len(),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    async fn run(&self, user_query: &str, mode: PromptMode) -> QueryOutcome {
        let started = Instant::now();
        tracing::info!("Processing query: {}", user_query);

        let mut outcome = match self.answer(user_query, mode).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Error in RAG pipeline: {}", e);
                Self::failed(user_query, e)
            }
        };
        outcome.latency_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    fn failed(user_query: &str, error: Error) -> QueryOutcome {
        QueryOutcome {
            query: user_query.to_string(),
            response: APOLOGY_RESPONSE.to_string(),
            chunks: Vec::new(),
            scores: Vec::new(),
            latency_ms: 0,
            error: Some(error.to_string()),
        }
    }

    async fn answer(&self, user_query: &str, mode: PromptMode) -> Result<QueryOutcome> {
        let prepared = self.prepare(user_query, mode).await?;
        let response = self.llm.generate(&prepared.prompt).await?;
        Ok(self.finish(user_query, mode, prepared, response))
    }

    async fn stream_answer(
        &self,
        user_query: &str,
        mode: PromptMode,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<QueryOutcome> {
        let prepared = self.prepare(user_query, mode).await?;
        let mut tokens = self.llm.generate_stream(&prepared.prompt).await?;

        let mut response = String::new();
        while let Some(token) = tokens.next().await {
            let token = token?;
            on_token(&token);
            response.push_str(&token);
        }
        if response.is_empty() {
            return Err(Error::llm("stream ended without any text"));
        }

        Ok(self.finish(user_query, mode, prepared, response))
    }

    /// Embed the query, retrieve context and build the prompt
    async fn prepare(&self, user_query: &str, mode: PromptMode) -> Result<PreparedQuery> {
        let embedding = self.embedder.embed(user_query).await?;
        let results = self.retriever.retrieve_with_scores(&embedding, self.top_k)?;
        let (chunks, scores): (Vec<Chunk>, Vec<f32>) =
            results.into_iter().map(|r| (r.chunk, r.score)).unzip();

        if chunks.is_empty() {
            tracing::warn!("No context retrieved for query");
        }
        let context = format_context(&chunks);

        let prompt = match mode {
            PromptMode::Conversational => {
                let history = {
                    let conversation = self.conversation.lock();
                    (!conversation.is_empty()).then(|| conversation.history_string())
                };
                match history {
                    Some(history) => PromptBuilder::followup_prompt(user_query, &context, &history),
                    None => PromptBuilder::rag_prompt(user_query, &context),
                }
            }
            PromptMode::OneShot(kind) => PromptBuilder::specialized_prompt(kind, user_query, &context),
        };

        Ok(PreparedQuery { chunks, scores, prompt })
    }

    /// Record a successful conversational turn and assemble the outcome
    fn finish(&self, user_query: &str, mode: PromptMode, prepared: PreparedQuery, response: String) -> QueryOutcome {
        if matches!(mode, PromptMode::Conversational) {
            let mut conversation = self.conversation.lock();
            conversation.add_user_message(user_query);
            conversation.add_assistant_message(response.clone());
        }

        QueryOutcome {
            query: user_query.to_string(),
            response,
            chunks: prepared.chunks,
            scores: prepared.scores,
            latency_ms: 0,
            error: None,
        }
    }
}
