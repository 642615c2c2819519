//! Metrics recorder configuration.

use quarry_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Metrics recorder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Ring buffer capacity; the oldest sample is dropped beyond this.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Maximum characters of query text kept in slow-sample reports.
    #[serde(default = "default_query_truncation")]
    pub query_truncation: usize,

    /// Window used by `export_for_monitoring`.
    #[serde(default = "default_export_window_minutes")]
    pub export_window_minutes: u32,
}

fn default_buffer_capacity() -> usize {
    10_000
}

fn default_query_truncation() -> usize {
    100
}

fn default_export_window_minutes() -> u32 {
    5
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            query_truncation: default_query_truncation(),
            export_window_minutes: default_export_window_minutes(),
        }
    }
}

impl MetricsConfig {
    /// Check field ranges.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::config("metrics.buffer_capacity must be > 0"));
        }
        if self.query_truncation == 0 {
            return Err(Error::config("metrics.query_truncation must be > 0"));
        }
        if self.export_window_minutes == 0 {
            return Err(Error::config("metrics.export_window_minutes must be > 0"));
        }
        Ok(())
    }
}
