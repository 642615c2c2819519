//! Error types for Quarry operations.
//!
//! This module provides the common `Error` type and `Result<T>` alias used
//! across all Quarry crates. Uses `thiserror` for derive macros.
//!
//! # Propagation
//!
//! - `Validation` and `IndexState` surface immediately and are never retried.
//! - `Provider` carries a `retryable` flag; the batch pipeline retries only
//!   retryable provider failures.
//! - `Persistence` covers store and persistent-cache failures. Cache failures
//!   are recovered locally by the embedding cache and never reach callers.

use thiserror::Error;

/// Errors that can occur in Quarry operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid input: empty text, weights not summing to 1, oversized batch.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Embedding provider failure (transport, quota, malformed output).
    #[error("Provider error: {message}")]
    Provider {
        /// Human-readable description.
        message: String,
        /// Whether repeating the call may succeed.
        retryable: bool,
    },

    /// Record or vector absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store or cache read/write failure.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Operation invalid for the current index state.
    #[error("Index state error: {0}")]
    IndexState(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a non-retryable provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            retryable: false,
        }
    }

    /// Create a retryable provider error (timeouts, rate limits, 5xx).
    pub fn provider_transient(msg: impl Into<String>) -> Self {
        Self::Provider {
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a persistence error.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create an index state error.
    pub fn index_state(msg: impl Into<String>) -> Self {
        Self::IndexState(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the failed operation may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider {
                retryable: true,
                ..
            }
        )
    }

    /// Stable short name of the error kind, for reports and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Provider { .. } => "provider",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence",
            Self::IndexState(_) => "index_state",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using Quarry's Error type.
pub type Result<T> = std::result::Result<T, Error>;
