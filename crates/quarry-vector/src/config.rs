//! Configuration for embedding generation and caching.

use quarry_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// EmbeddingConfig
// ============================================================================

/// Embedding provider configuration.
///
/// `model_tag` is baked into every cache key; bump it whenever the model or
/// its preprocessing changes so old vectors are never served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider type: "openai" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model identifier sent to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// Cache key version tag.
    #[serde(default = "default_model_tag")]
    pub model_tag: String,

    /// Expected vector dimension D.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Provider's maximum texts per batch request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Provider request quota per minute.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; falls back to `OPENAI_API_KEY` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_model_tag() -> String {
    "text-embedding-3-small:v1".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_max_batch_size() -> usize {
    100
}

fn default_requests_per_minute() -> u32 {
    3000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            model_tag: default_model_tag(),
            dimension: default_dimension(),
            max_batch_size: default_max_batch_size(),
            requests_per_minute: default_requests_per_minute(),
            timeout_secs: default_timeout_secs(),
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    /// Provider request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured key, or `OPENAI_API_KEY` from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::config("embedding.dimension must be > 0"));
        }
        if self.max_batch_size == 0 {
            return Err(Error::config("embedding.max_batch_size must be > 0"));
        }
        if self.requests_per_minute == 0 {
            return Err(Error::config("embedding.requests_per_minute must be > 0"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("embedding.timeout_secs must be > 0"));
        }
        if self.model_tag.trim().is_empty() {
            return Err(Error::config("embedding.model_tag must not be empty"));
        }
        match self.provider.as_str() {
            "openai" | "mock" => Ok(()),
            other => Err(Error::config(format!(
                "embedding.provider: unknown provider '{other}'"
            ))),
        }
    }
}

// ============================================================================
// CacheConfig
// ============================================================================

/// Two-tier embedding cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Process-local LRU capacity N.
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,

    /// Persistent-tier TTL in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Key namespace; `clear()` deletes `{namespace}:*`.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_local_capacity() -> usize {
    1000
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_namespace() -> String {
    "embedding".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_capacity: default_local_capacity(),
            ttl_secs: default_ttl_secs(),
            namespace: default_namespace(),
        }
    }
}

impl CacheConfig {
    /// Persistent-tier TTL.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.local_capacity == 0 {
            return Err(Error::config("cache.local_capacity must be > 0"));
        }
        if self.ttl_secs == 0 {
            return Err(Error::config("cache.ttl_secs must be > 0"));
        }
        if self.namespace.is_empty() || self.namespace.contains('*') {
            return Err(Error::config(
                "cache.namespace must be non-empty and contain no '*'",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_defaults() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.dimension, 1536);
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.requests_per_minute, 3000);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.model_tag, "text-embedding-3-small:v1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_embedding_rejects_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "fastembed".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fastembed"));
    }

    #[test]
    fn test_embedding_rejects_zero_rpm() {
        let config = EmbeddingConfig {
            requests_per_minute: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.local_capacity, 1000);
        assert_eq!(config.ttl(), Duration::from_secs(604_800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cache_rejects_wildcard_namespace() {
        let config = CacheConfig {
            namespace: "emb*".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_api_key_wins() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert_eq!(config.resolve_api_key().as_deref(), Some("sk-test"));
    }
}
