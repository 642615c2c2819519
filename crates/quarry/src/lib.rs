//! Hybrid semantic and keyword retrieval over catalog records.
//!
//! This umbrella crate wires the component crates into one [`Quarry`]
//! service and re-exports them for convenience.
//!
//! # Example
//!
//! ```no_run
//! use quarry::{Quarry, QuarryConfig};
//! use quarry::core::SearchFilters;
//!
//! # async fn run() -> quarry::core::Result<()> {
//! let quarry = Quarry::connect(QuarryConfig::default()).await?;
//! let outcome = quarry
//!     .smart_search("computer science research", 5, &SearchFilters::none())
//!     .await?;
//! for result in &outcome.results {
//!     println!("{} {:.3}", result.key, result.combined_score);
//! }
//! quarry.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod service;

pub use config::QuarryConfig;
pub use service::{Components, EmbeddingStats, Quarry};

pub use quarry_core as core;
pub use quarry_index as index;
pub use quarry_metrics as metrics;
pub use quarry_pipeline as pipeline;
pub use quarry_search as search;
pub use quarry_storage as storage;
pub use quarry_vector as vector;
