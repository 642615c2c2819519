//! Embedding provider trait and mock implementation.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over
//! different embedding generation backends.
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic bag-of-words vectors for testing
//! - `OpenAiEmbeddingProvider`: OpenAI-compatible HTTP API (see [`crate::openai`])

use async_trait::async_trait;
use quarry_core::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Trait for generating text embeddings.
///
/// Implementations wrap a specific embedding backend and provide a uniform
/// async interface. The trait requires `Send + Sync` to allow safe sharing
/// across async tasks.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for a batch of texts, in input order.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends that support native batching should override this.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// The embedding dimension.
    fn dimension(&self) -> usize;

    /// Maximum texts accepted by one `embed_batch` call.
    fn max_batch_size(&self) -> usize {
        100
    }

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// A mock embedding provider for testing.
///
/// Each lowercase alphanumeric token is hashed into one of `dimension`
/// buckets and the bucket counts are unit-normalised, so texts sharing words
/// are close in cosine space. Output is deterministic for a given input.
///
/// Failures and latency can be injected to exercise retry and timeout paths.
pub struct MockEmbeddingProvider {
    dimension: usize,
    max_batch_size: usize,
    delay: Option<Duration>,
    calls: AtomicUsize,
    failures_remaining: AtomicUsize,
    fail_always: AtomicBool,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_batch_size: 100,
            delay: None,
            calls: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            fail_always: AtomicBool::new(false),
        }
    }

    /// Override the advertised batch limit.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next `n` calls with a retryable error.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Fail every call with a retryable error while set.
    pub fn set_fail_always(&self, fail: bool) {
        self.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Number of provider calls made (single and batch each count once).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin_call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_always.load(Ordering::SeqCst) {
            return Err(Error::provider_transient("mock provider: injected failure"));
        }
        let consumed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(Error::provider_transient("mock provider: injected failure"));
        }
        Ok(())
    }

    /// Generate a deterministic embedding from text.
    fn deterministic_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return embedding;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&hash.as_bytes()[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dimension as u64) as usize;
            embedding[idx] += 1.0;
        }

        // Normalize to unit vector
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.begin_call().await?;
        Ok(self.deterministic_embedding(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.begin_call().await?;
        Ok(texts
            .iter()
            .map(|t| self.deterministic_embedding(t))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Tests
// ============================================================================
