//! Batch pipeline configuration.

use quarry_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Batch embedding pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per chunk; clamped to the provider's batch limit.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Retries after the first attempt of a chunk.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Age in days beyond which an embedding is stale.
    #[serde(default = "default_stale_days")]
    pub stale_days: u32,
}

fn default_chunk_size() -> usize {
    100
}

fn default_max_retries() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_stale_days() -> u32 {
    30
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            stale_days: default_stale_days(),
        }
    }
}

impl PipelineConfig {
    /// First backoff delay.
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Maximum backoff delay.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("pipeline.chunk_size must be > 0"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::config(
                "pipeline.max_delay_ms must be >= pipeline.base_delay_ms",
            ));
        }
        Ok(())
    }
}

/// Delay between chunks that keeps one request per chunk under `rpm`.
pub fn pacing_delay(requests_per_minute: u32) -> Duration {
    if requests_per_minute == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(60_000 / u64::from(requests_per_minute))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_chunk_rejected() {
        let config = PipelineConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pacing_delay() {
        assert_eq!(pacing_delay(3000), Duration::from_millis(20));
        assert_eq!(pacing_delay(60), Duration::from_secs(1));
        assert_eq!(pacing_delay(0), Duration::ZERO);
    }
}
