//! OpenAI-compatible embedding provider.
//!
//! Talks to any server exposing `POST {base_url}/v1/embeddings`. HTTP 429
//! and 5xx responses become retryable provider errors; other failures are
//! permanent.

use async_trait::async_trait;
use quarry_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::embedding::EmbeddingProvider;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Embedding provider using an OpenAI-compatible HTTP API.
pub struct OpenAiEmbeddingProvider {
    api_key: Option<String>,
    model: String,
    url: String,
    dimension: usize,
    max_batch_size: usize,
    client: reqwest::Client,
}

impl OpenAiEmbeddingProvider {
    /// Creates a provider from configuration.
    ///
    /// The per-request timeout is enforced by the generator, not here.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            url: format!("{}/v1/embeddings", config.base_url.trim_end_matches('/')),
            dimension: config.dimension,
            max_batch_size: config.max_batch_size,
            client,
        })
    }

    /// The resolved endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        // Connection-level failures are transient.
        let response = request
            .send()
            .await
            .map_err(|e| Error::provider_transient(format!("embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status.as_u16(), &error_text));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("failed to parse embedding response: {e}")))?;

        order_by_index(parsed.data, texts.len())
    }
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, body: &str) -> Error {
    let message = format!("embedding API error {status}: {body}");
    if status == 429 || (500..600).contains(&status) {
        Error::provider_transient(message)
    } else {
        Error::provider(message)
    }
}

/// Reassemble response rows in request order.
fn order_by_index(mut data: Vec<EmbedData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(Error::provider(format!(
            "embedding API returned {} vectors for {expected} inputs",
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.request(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("no embedding returned"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_construction() {
        let config = EmbeddingConfig {
            base_url: "http://localhost:8080/".into(),
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let provider = OpenAiEmbeddingProvider::new(&config).unwrap();
        assert_eq!(provider.url(), "http://localhost:8080/v1/embeddings");
        assert_eq!(provider.dimension(), 1536);
        assert_eq!(provider.max_batch_size(), 100);
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn test_status_classification() {
        assert!(status_error(429, "slow down").is_retryable());
        assert!(status_error(503, "unavailable").is_retryable());
        assert!(!status_error(400, "bad input").is_retryable());
        assert!(!status_error(401, "no key").is_retryable());
    }

    #[test]
    fn test_order_by_index() {
        let data = vec![
            EmbedData {
                index: 1,
                embedding: vec![2.0],
            },
            EmbedData {
                index: 0,
                embedding: vec![1.0],
            },
        ];
        assert_eq!(order_by_index(data, 2).unwrap(), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_order_by_index_count_mismatch() {
        let data = vec![EmbedData {
            index: 0,
            embedding: vec![1.0],
        }];
        let err = order_by_index(data, 2).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.1,0.2]}],"model":"m"}"#;
        let parsed: EmbedResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }

    // Integration test (requires API key, run manually)
    #[tokio::test]
    #[ignore]
    async fn test_openai_provider_integration() {
        let config = EmbeddingConfig::default();
        if config.resolve_api_key().is_none() {
            return;
        }
        let provider = OpenAiEmbeddingProvider::new(&config).unwrap();
        let embedding = provider.embed("computer science").await.unwrap();
        assert_eq!(embedding.len(), config.dimension);
    }
}
