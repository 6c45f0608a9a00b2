//! Embedding client: turns text batches into fixed-dimension vectors through a
//! remote provider.
//!
//! [`Embedder`] is the provider seam (OpenAI-compatible HTTP, Ollama, or a test
//! double). [`EmbeddingClient`] adds what every provider needs on top: batching,
//! a per-call timeout, count and dimension checks, and bounded retry with
//! exponential backoff for corpus builds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, Provider};
use crate::ollama::OllamaEmbedder;
use crate::openai::OpenAiEmbedder;

pub const DEFAULT_BATCH_SIZE: usize = 1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// A remote embedding provider. One call embeds one batch; implementations must
/// return one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Retry settings for corpus embedding. Delay before attempt `n` (1-based retry
/// number) is `base_delay * 2^(n-1)`, with the exponent capped at 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .checked_mul(1u32 << retry.saturating_sub(1).min(5))
            .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}

/// Wraps an [`Embedder`] with batching, timeout, validation and retry.
#[derive(Clone)]
pub struct EmbeddingClient {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("model", &self.embedder.model_name())
            .field("batch_size", &self.batch_size)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl EmbeddingClient {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Build a client for the configured provider.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let embedder: Arc<dyn Embedder> = match config.provider {
            Provider::OpenAi => Arc::new(OpenAiEmbedder::from_config(config)?),
            Provider::Ollama => Arc::new(OllamaEmbedder::from_config(config)?),
        };
        Ok(Self::new(embedder)
            .with_batch_size(config.batch_size)
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_retry(RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
            }))
    }

    /// Texts per provider call. Zero is treated as one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed a whole corpus. All-or-nothing: any batch that still fails after
    /// its retries fails the entire call. Every returned vector has the same
    /// dimension.
    pub async fn embed_corpus(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        let batches = texts.len().div_ceil(self.batch_size);
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(batch = i + 1, of = batches, size = batch.len(), "embedding batch");
            vectors.extend(self.call_with_retry(batch).await?);
        }
        check_uniform(&vectors)?;
        Ok(vectors)
    }

    /// Embed one query string. Single attempt, no retry.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.call(&[text.to_string()]).await?;
        check_uniform(&vectors)?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::Malformed("empty embedding response".into()))
    }

    async fn call_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut retry = 0;
        loop {
            match self.call(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = self.retry.delay(retry);
                    warn!(
                        error = %e,
                        retry,
                        max_retries = self.retry.max_retries,
                        ?delay,
                        "embedding call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let vectors = tokio::time::timeout(self.timeout, self.embedder.embed(batch))
            .await
            .map_err(|_| EmbedError::Timeout(self.timeout))??;
        if vectors.len() != batch.len() {
            return Err(EmbedError::Malformed(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

fn check_uniform(vectors: &[Vec<f32>]) -> Result<(), EmbedError> {
    let Some(first) = vectors.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(EmbedError::Malformed("zero-length embedding".into()));
    }
    if let Some((row, v)) = vectors
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != first.len())
    {
        return Err(EmbedError::Malformed(format!(
            "embedding {row} has dimension {}, expected {}",
            v.len(),
            first.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("API key not set (expected in ${0})")]
    MissingApiKey(String),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("embedding API rejected credentials (HTTP {0})")]
    Unauthorized(u16),
    #[error("embedding API rate limited the request")]
    RateLimited,
    #[error("embedding API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed embedding response: {0}")]
    Malformed(String),
    #[error("Ollama request failed: {0}")]
    Ollama(#[from] ollama_rs::error::OllamaError),
}

impl EmbedError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbedError::RateLimited | EmbedError::Transport(_) | EmbedError::Timeout(_) => true,
            EmbedError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Returns `[len, index]` per text, failing the first `failures` calls with `error`.
    struct Scripted {
        calls: AtomicUsize,
        batches: Mutex<Vec<usize>>,
        failures: usize,
        error: fn() -> EmbedError,
    }

    impl Scripted {
        fn new(failures: usize, error: fn() -> EmbedError) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                batches: Mutex::new(Vec::new()),
                failures,
                error,
            }
        }
    }

    #[async_trait]
    impl Embedder for Scripted {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.batches.lock().unwrap().push(texts.len());
            if n < self.failures {
                return Err((self.error)());
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn quick_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn preserves_order_across_batches() {
        let inner = Arc::new(Scripted::new(0, || EmbedError::RateLimited));
        let client = EmbeddingClient::new(inner.clone()).with_batch_size(2);
        let out = client
            .embed_corpus(&texts(&["a", "bbb", "cc", "dddd", "e"]))
            .await
            .unwrap();
        let lens: Vec<f32> = out.iter().map(|v| v[0]).collect();
        assert_eq!(lens, [1.0, 3.0, 2.0, 4.0, 1.0]);
        assert_eq!(*inner.batches.lock().unwrap(), [2, 2, 1]);
    }

    #[tokio::test]
    async fn default_batch_size_is_one_call_per_text() {
        let inner = Arc::new(Scripted::new(0, || EmbedError::RateLimited));
        let client = EmbeddingClient::new(inner.clone());
        client.embed_corpus(&texts(&["a", "b", "c"])).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let inner = Arc::new(Scripted::new(2, || EmbedError::RateLimited));
        let client = EmbeddingClient::new(inner.clone()).with_retry(quick_retry(3));
        assert!(client.embed_corpus(&texts(&["a"])).await.is_ok());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let inner = Arc::new(Scripted::new(10, || EmbedError::Transport("reset".into())));
        let client = EmbeddingClient::new(inner.clone()).with_retry(quick_retry(2));
        let err = client.embed_corpus(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::Transport(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_auth_failures() {
        let inner = Arc::new(Scripted::new(10, || EmbedError::Unauthorized(401)));
        let client = EmbeddingClient::new(inner.clone()).with_retry(quick_retry(5));
        let err = client.embed_corpus(&texts(&["a"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::Unauthorized(401)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_is_single_attempt() {
        let inner = Arc::new(Scripted::new(1, || EmbedError::RateLimited));
        let client = EmbeddingClient::new(inner.clone()).with_retry(quick_retry(3));
        assert!(client.embed_query("q").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    struct Slow;

    #[async_trait]
    impl Embedder for Slow {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        fn model_name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let client = EmbeddingClient::new(Arc::new(Slow)).with_timeout(Duration::from_millis(20));
        let err = client.embed_query("q").await.unwrap_err();
        assert!(matches!(err, EmbedError::Timeout(_)));
    }

    struct Ragged;

    #[async_trait]
    impl Embedder for Ragged {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|t| vec![0.0; t.len()]).collect())
        }

        fn model_name(&self) -> &str {
            "ragged"
        }
    }

    #[tokio::test]
    async fn rejects_mixed_dimensions() {
        let client = EmbeddingClient::new(Arc::new(Ragged)).with_batch_size(8);
        let err = client.embed_corpus(&texts(&["ab", "abc"])).await.unwrap_err();
        assert!(matches!(err, EmbedError::Malformed(_)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(p.delay(1), Duration::from_millis(100));
        assert_eq!(p.delay(2), Duration::from_millis(200));
        assert_eq!(p.delay(4), Duration::from_millis(800));
        assert_eq!(p.delay(9), Duration::from_millis(3200));
    }

    #[test]
    fn backoff_saturates_on_huge_base_delay() {
        let p = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(u64::MAX),
        };
        assert_eq!(p.delay(1), Duration::from_millis(u64::MAX));
        assert_eq!(p.delay(6), Duration::MAX);
    }
}
