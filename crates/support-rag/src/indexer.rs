//! Offline index build: load, normalize, chunk, embed, build, persist

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RagConfig;
use crate::error::Result;
use crate::ingestion::{load_knowledge_base, save_chunks_json, DocumentChunker, TextNormalizer};
use crate::providers::EmbeddingProvider;
use crate::retrieval::VectorIndex;
use crate::types::IndexStats;

/// Called after each embedded batch with (embedded so far, total)
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Summary of a completed build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    /// Characters in the raw knowledge base
    pub raw_chars: usize,
    /// Characters after normalization
    pub normalized_chars: usize,
    pub chunks: usize,
    /// Chunks whose embedding fell back to the zero vector
    pub zero_vectors: usize,
    pub stats: IndexStats,
    pub elapsed: Duration,
}

/// Runs the whole build pipeline against the configured paths
pub struct IndexBuilder {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    progress: Option<ProgressFn>,
}

impl IndexBuilder {
    pub fn new(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            config,
            embedder,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Build and persist the index, returning the built index alongside its report
    pub async fn run(&self) -> Result<(VectorIndex, BuildReport)> {
        let started = Instant::now();
        let paths = &self.config.paths;

        tracing::info!("Loading knowledge base from {}", paths.knowledge_base.display());
        let raw = load_knowledge_base(&paths.knowledge_base)?;
        let normalized = TextNormalizer::new().normalize(&raw);
        tracing::info!(
            raw_chars = raw.chars().count(),
            normalized_chars = normalized.chars().count(),
            "Preprocessed knowledge base"
        );

        let chunker = DocumentChunker::from_config(&self.config.chunking)?;
        let chunks = chunker.chunk_document(&normalized);
        save_chunks_json(&chunks, &paths.chunks_file)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embed_all(&texts).await?;
        let zero_vectors = embeddings
            .iter()
            .filter(|v| v.iter().all(|x| *x == 0.0))
            .count();
        if zero_vectors > 0 {
            tracing::warn!("{} chunks were embedded as zero vectors and will never match", zero_vectors);
        }

        let mut index = VectorIndex::from_config(&self.config);
        index.build(&embeddings, chunks)?;
        index.persist()?;

        let report = BuildReport {
            raw_chars: raw.chars().count(),
            normalized_chars: normalized.chars().count(),
            chunks: index.chunks().len(),
            zero_vectors,
            stats: index.stats(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            chunks = report.chunks,
            vectors = report.stats.total_vectors,
            dimension = report.stats.dimension,
            "Index build complete in {:?}",
            report.elapsed
        );
        Ok((index, report))
    }

    /// Embed texts in order, pacing requests and reporting progress per batch
    async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch_size = self.config.embeddings.batch_size.max(1);
        let delay = self.config.embeddings.request_delay();
        let mut embeddings = Vec::with_capacity(texts.len());

        tracing::info!(
            "Generating embeddings for {} texts with {}",
            texts.len(),
            self.embedder.name()
        );

        for batch in texts.chunks(batch_size) {
            for text in batch {
                embeddings.push(self.embedder.embed(text).await?);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            if let Some(progress) = &self.progress {
                progress(embeddings.len(), texts.len());
            }
        }

        Ok(embeddings)
    }
}
