//! Storage connection configuration.

use quarry_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the catalog store and persistent cache.
///
/// With no `database_url` the service runs on the in-memory store; with no
/// `redis_url` the embedding cache runs local-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Postgres connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Redis connection string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_url: Option<String>,

    /// Catalog table name.
    #[serde(default = "default_table")]
    pub table: String,

    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Keys fetched per Redis `SCAN` round trip.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

fn default_table() -> String {
    "catalog_records".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_scan_count() -> usize {
    500
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            table: default_table(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            scan_count: default_scan_count(),
        }
    }
}

impl StoreConfig {
    /// Pool acquire timeout.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.table) {
            return Err(Error::config(format!(
                "store.table '{}' is not a plain identifier",
                self.table
            )));
        }
        if self.max_connections == 0 {
            return Err(Error::config("store.max_connections must be > 0"));
        }
        if self.scan_count == 0 {
            return Err(Error::config("store.scan_count must be > 0"));
        }
        Ok(())
    }
}

/// Whether `name` can be interpolated into SQL unquoted.
pub(crate) fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
