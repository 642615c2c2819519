//! Embedding generator: validated, time-bounded calls to a provider.

use quarry_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;

/// Thin wrapper around an [`EmbeddingProvider`] that enforces input and
/// output shape.
///
/// - Empty (or whitespace-only) text is a `Validation` error.
/// - A batch larger than [`max_batch_size`](Self::max_batch_size) is a
///   `Validation` error; callers pre-chunk.
/// - A call exceeding the timeout is a retryable `Provider` error.
/// - A vector whose length differs from D, or a batch response with the
///   wrong count, is a `Provider` error.
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
    max_batch_size: usize,
    requests_per_minute: u32,
    timeout: Duration,
}

impl EmbeddingGenerator {
    /// Create a generator expecting `config.dimension`-length vectors.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Result<Self> {
        config.validate()?;
        if provider.dimension() != config.dimension {
            log::warn!(
                "Provider '{}' advertises dimension {} but {} is configured",
                provider.name(),
                provider.dimension(),
                config.dimension
            );
        }
        Ok(Self {
            max_batch_size: config.max_batch_size.min(provider.max_batch_size()).max(1),
            provider,
            dimension: config.dimension,
            requests_per_minute: config.requests_per_minute,
            timeout: config.timeout(),
        })
    }

    /// Expected vector dimension D.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Largest accepted batch.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Provider request quota per minute.
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The wrapped provider's name.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed one text.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::validation("cannot embed empty text"));
        }

        let vector = tokio::time::timeout(self.timeout, self.provider.embed(text))
            .await
            .map_err(|_| self.timeout_error())??;

        self.check_dimension(&vector, 0)?;
        Ok(vector)
    }

    /// Embed a pre-chunked batch, returning vectors in input order.
    pub async fn generate_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.max_batch_size {
            return Err(Error::validation(format!(
                "batch of {} exceeds provider maximum {}",
                texts.len(),
                self.max_batch_size
            )));
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(Error::validation(format!(
                "cannot embed empty text (batch position {pos})"
            )));
        }

        let vectors = tokio::time::timeout(self.timeout, self.provider.embed_batch(texts))
            .await
            .map_err(|_| self.timeout_error())??;

        if vectors.len() != texts.len() {
            return Err(Error::provider(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        for (pos, vector) in vectors.iter().enumerate() {
            self.check_dimension(vector, pos)?;
        }
        Ok(vectors)
    }

    fn check_dimension(&self, vector: &[f32], pos: usize) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::provider(format!(
                "provider returned dimension {} at position {pos}, expected {}",
                vector.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    fn timeout_error(&self) -> Error {
        Error::provider_transient(format!(
            "provider '{}' timed out after {:?}",
            self.provider.name(),
            self.timeout
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;

    fn config(dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "mock".into(),
            dimension,
            max_batch_size: 4,
            ..Default::default()
        }
    }

    fn generator(provider: MockEmbeddingProvider, dimension: usize) -> EmbeddingGenerator {
        EmbeddingGenerator::new(Arc::new(provider), &config(dimension)).unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_dimension_d() {
        let generator = generator(MockEmbeddingProvider::new(8), 8);
        let vector = generator.generate("computer science").await.unwrap();
        assert_eq!(vector.len(), 8);
    }

    #[tokio::test]
    async fn test_generate_empty_text_is_validation_error() {
        let generator = generator(MockEmbeddingProvider::new(8), 8);
        for text in ["", "   ", "\n\t"] {
            let err = generator.generate(text).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_generate_dimension_mismatch_is_provider_error() {
        let generator = generator(MockEmbeddingProvider::new(4), 8);
        let err = generator.generate("text").await.unwrap_err();
        assert!(matches!(err, Error::Provider { retryable: false, .. }));
    }

    #[tokio::test]
    async fn test_generate_propagates_provider_failure() {
        let provider = MockEmbeddingProvider::new(8);
        provider.fail_next(1);
        let generator = generator(provider, 8);
        let err = generator.generate("text").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_timeout_is_retryable() {
        let provider = MockEmbeddingProvider::new(8).with_delay(Duration::from_secs(60));
        let generator = generator(provider, 8);
        let err = generator.generate("slow").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_generate_batch_preserves_order() {
        let generator = generator(MockEmbeddingProvider::new(16), 16);
        let texts = ["alpha", "beta", "gamma"];
        let batch = generator.generate_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 3);
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(&generator.generate(text).await.unwrap(), vector);
        }
    }

    #[tokio::test]
    async fn test_generate_batch_oversized_is_validation_error() {
        let generator = generator(MockEmbeddingProvider::new(8), 8);
        let texts = ["a", "b", "c", "d", "e"];
        let err = generator.generate_batch(&texts).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_generate_batch_rejects_empty_member() {
        let generator = generator(MockEmbeddingProvider::new(8), 8);
        let err = generator.generate_batch(&["a", " "]).await.unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[tokio::test]
    async fn test_generate_batch_empty_is_noop() {
        let provider = Arc::new(MockEmbeddingProvider::new(8));
        let generator = EmbeddingGenerator::new(provider.clone(), &config(8)).unwrap();
        assert!(generator.generate_batch(&[]).await.unwrap().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_max_batch_size_is_min_of_config_and_provider() {
        let provider = MockEmbeddingProvider::new(8).with_max_batch_size(2);
        let generator = generator(provider, 8);
        assert_eq!(generator.max_batch_size(), 2);
    }
}
