//! Retry with exponential backoff for provider requests

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

use super::embedding::EmbeddingProvider;

/// Backoff schedule and exhaustion behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Factor applied to the delay after each failed attempt
    pub multiplier: u32,
    /// Return a zero vector instead of an error once attempts are exhausted
    pub zero_fallback: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            multiplier: config.multiplier.max(1),
            zero_fallback: config.zero_fallback,
        }
    }

    /// Policy that tries once and propagates the failure
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            multiplier: 1,
            zero_fallback: false,
        }
    }

    /// Delay after the given failed attempt (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Embedding provider wrapper that retries transient failures.
///
/// Non-retryable failures stop retrying immediately. Once no attempt is left the
/// zero-vector fallback applies if enabled. Configuration errors, including a
/// provider returning vectors of the wrong dimension, always propagate.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: EmbeddingProvider> RetryingEmbedder<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    fn check_dimensions(&self, embedding: Vec<f32>) -> Result<Vec<f32>> {
        let expected = self.inner.dimensions();
        if embedding.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }
        Ok(embedding)
    }

    fn exhausted(&self, text: &str, error: Error) -> Result<Vec<f32>> {
        if self.policy.zero_fallback && !error.is_configuration() {
            let preview: String = text.chars().take(50).collect();
            tracing::error!(
                provider = self.inner.name(),
                "Embedding failed for {:?}..., using zero vector: {}",
                preview,
                error
            );
            return Ok(vec![0.0; self.inner.dimensions()]);
        }
        Err(error)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. The last error is returned.
pub async fn retry_request<F, Fut, T>(policy: &RetryPolicy, label: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        attempt += 1;
        if !error.is_retryable() || attempt >= policy.max_attempts {
            return Err(error);
        }

        let delay = policy.delay_for(attempt - 1);
        tracing::warn!(
            "{} request failed (attempt {}/{}), retrying in {:?}: {}",
            label,
            attempt,
            policy.max_attempts,
            delay,
            error
        );
        sleep(delay).await;
    }
}

#[async_trait]
impl<E: EmbeddingProvider> EmbeddingProvider for RetryingEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match retry_request(&self.policy, "Embedding", || self.inner.embed(text)).await {
            Ok(embedding) => self.check_dimensions(embedding),
            Err(error) => self.exhausted(text, error),
        }
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn health_check(&self) -> Result<bool> {
        self.inner.health_check().await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted outcomes, then succeeds
    struct ScriptedEmbedder {
        script: Mutex<VecDeque<Result<Vec<f32>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedEmbedder {
        fn new(script: Vec<Result<Vec<f32>>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or_else(|| Ok(vec![1.0; 4]))
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn policy(zero_fallback: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            multiplier: 2,
            zero_fallback,
        }
    }

    fn rate_limited() -> Result<Vec<f32>> {
        Err(Error::RateLimited("429 quota exceeded".into()))
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            multiplier: 2,
            zero_fallback: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(4));
        assert_eq!(policy.delay_for(2), Duration::from_secs(8));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(2000));
        assert!(policy.zero_fallback);
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let embedder = RetryingEmbedder::new(
            ScriptedEmbedder::new(vec![rate_limited(), Ok(vec![0.5; 4])]),
            policy(false),
        );
        assert_eq!(embedder.embed("hi").await.unwrap(), vec![0.5; 4]);
        assert_eq!(embedder.inner().calls(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_returns_zero_vector() {
        let embedder = RetryingEmbedder::new(
            ScriptedEmbedder::new(vec![rate_limited(), rate_limited(), rate_limited()]),
            policy(true),
        );
        assert_eq!(embedder.embed("hi").await.unwrap(), vec![0.0; 4]);
        assert_eq!(embedder.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_without_fallback_errors() {
        let embedder = RetryingEmbedder::new(
            ScriptedEmbedder::new(vec![rate_limited(), rate_limited(), rate_limited()]),
            policy(false),
        );
        assert!(matches!(embedder.embed("hi").await, Err(Error::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let embedder = RetryingEmbedder::new(
            ScriptedEmbedder::new(vec![Err(Error::embedding("bad request"))]),
            policy(true),
        );
        assert_eq!(embedder.embed("hi").await.unwrap(), vec![0.0; 4]);
        assert_eq!(embedder.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_never_masked() {
        let embedder = RetryingEmbedder::new(
            ScriptedEmbedder::new(vec![Ok(vec![1.0; 3])]),
            policy(true),
        );
        assert!(matches!(
            embedder.embed("hi").await,
            Err(Error::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn test_batch_uses_retry_per_text() {
        let embedder = RetryingEmbedder::new(
            ScriptedEmbedder::new(vec![Ok(vec![0.1; 4]), rate_limited(), Ok(vec![0.2; 4])]),
            policy(false),
        );
        let texts = vec!["a".to_string(), "b".to_string()];
        let out = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(out, vec![vec![0.1; 4], vec![0.2; 4]]);
    }
}
