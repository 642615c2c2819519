//! Index lifecycle configuration.

use quarry_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::types::IndexParams;

const GIB: u64 = 1024 * 1024 * 1024;

/// Approximate index configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index name in the catalog store.
    #[serde(default = "default_name")]
    pub name: String,

    /// Max connections per graph node (HNSW `m`).
    #[serde(default = "default_m")]
    pub m: u32,

    /// Construction candidate-list size (HNSW `ef_construction`).
    #[serde(default = "default_ef_construction")]
    pub ef_construction: u32,

    /// Planner statistics older than this are reported as stale.
    #[serde(default = "default_stale_stats_days")]
    pub stale_stats_days: u32,

    /// Index size above which maintenance is suggested.
    #[serde(default = "default_large_index_bytes")]
    pub large_index_bytes: u64,

    /// Dead-tuple ratio above which VACUUM is suggested.
    #[serde(default = "default_dead_tuple_ratio")]
    pub dead_tuple_ratio: f64,
}

fn default_name() -> String {
    "catalog_embedding_hnsw_idx".to_string()
}

fn default_m() -> u32 {
    16
}

fn default_ef_construction() -> u32 {
    64
}

fn default_stale_stats_days() -> u32 {
    7
}

fn default_large_index_bytes() -> u64 {
    GIB
}

fn default_dead_tuple_ratio() -> f64 {
    0.2
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            m: default_m(),
            ef_construction: default_ef_construction(),
            stale_stats_days: default_stale_stats_days(),
            large_index_bytes: default_large_index_bytes(),
            dead_tuple_ratio: default_dead_tuple_ratio(),
        }
    }
}

impl IndexConfig {
    /// Build parameters for `create`.
    pub fn params(&self) -> IndexParams {
        IndexParams {
            m: self.m,
            ef_construction: self.ef_construction,
        }
    }

    /// Check field ranges.
    ///
    /// The name is interpolated into DDL, so it is restricted to ASCII
    /// identifier characters.
    pub fn validate(&self) -> Result<()> {
        let valid_name = !self.name.is_empty()
            && !self.name.starts_with(|c: char| c.is_ascii_digit())
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(Error::config(format!(
                "index.name '{}' is not a plain identifier",
                self.name
            )));
        }
        if !(2..=100).contains(&self.m) {
            return Err(Error::config("index.m must be in 2..=100"));
        }
        if !(4..=1000).contains(&self.ef_construction) {
            return Err(Error::config("index.ef_construction must be in 4..=1000"));
        }
        if self.ef_construction < 2 * self.m {
            return Err(Error::config(
                "index.ef_construction must be at least twice index.m",
            ));
        }
        if !(0.0..=1.0).contains(&self.dead_tuple_ratio) {
            return Err(Error::config("index.dead_tuple_ratio must be in [0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.name, "catalog_embedding_hnsw_idx");
        assert_eq!(config.params(), IndexParams { m: 16, ef_construction: 64 });
        assert_eq!(config.large_index_bytes, GIB);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unsafe_name() {
        for name in ["", "idx; DROP TABLE x", "1idx", "idx-name"] {
            let config = IndexConfig {
                name: name.into(),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{name}");
        }
    }

    #[test]
    fn test_rejects_small_ef_construction() {
        let config = IndexConfig {
            m: 32,
            ef_construction: 40,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
