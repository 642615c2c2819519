//! Domain types shared by every Quarry crate.
//!
//! Catalog records are owned by the external ingestion process; Quarry only
//! reads them and refreshes their embedding columns. Search results are
//! transient and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// ============================================================================
// Catalog records
// ============================================================================

/// Unique two-part grouping key of a catalog record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    /// Owning organization (e.g. an institution).
    pub organization: String,
    /// Program or offering within the organization.
    pub program: String,
}

impl RecordKey {
    /// Create a new key.
    pub fn new(organization: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            program: program.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.organization, self.program)
    }
}

/// A short structured catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Store-assigned identifier.
    pub id: String,

    /// Unique grouping key.
    pub key: RecordKey,

    /// Free-text description.
    #[serde(default)]
    pub description: String,

    /// Optional category (e.g. "engineering").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Optional location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Feature list.
    #[serde(default)]
    pub features: Vec<String>,

    /// Curated keyword list used by keyword search.
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Embedding vector; `None` until the batch pipeline generates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// When `embedding` was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_updated_at: Option<DateTime<Utc>>,
}

impl CatalogRecord {
    /// Create a record with only its identity populated.
    pub fn new(
        id: impl Into<String>,
        organization: impl Into<String>,
        program: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            key: RecordKey::new(organization, program),
            description: String::new(),
            category: None,
            location: None,
            features: Vec::new(),
            keywords: Vec::new(),
            embedding: None,
            embedding_updated_at: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the feature list.
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Set the keyword list.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Set a pre-computed embedding.
    pub fn with_embedding(mut self, embedding: Vec<f32>, updated_at: DateTime<Utc>) -> Self {
        self.embedding = Some(embedding);
        self.embedding_updated_at = Some(updated_at);
        self
    }

    /// The minimal projection used to build embedding text.
    pub fn embedding_input(&self) -> EmbeddingInput {
        EmbeddingInput {
            id: self.id.clone(),
            key: self.key.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            location: self.location.clone(),
            features: self.features.clone(),
            keywords: self.keywords.clone(),
        }
    }
}

/// Minimal record fields fetched by the batch pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingInput {
    /// Record identifier.
    pub id: String,
    /// Grouping key.
    pub key: RecordKey,
    /// Description.
    pub description: String,
    /// Category.
    pub category: Option<String>,
    /// Location.
    pub location: Option<String>,
    /// Features.
    pub features: Vec<String>,
    /// Keywords.
    pub keywords: Vec<String>,
}

/// A freshly generated vector for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingUpdate {
    /// Record identifier.
    pub id: String,
    /// New embedding.
    pub embedding: Vec<f32>,
}

/// Embedding coverage across the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingCoverage {
    /// Total records.
    pub total: usize,
    /// Records with a non-null embedding.
    pub with_embedding: usize,
}

// ============================================================================
// Search inputs
// ============================================================================

/// Optional record filters applied by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Exact organization match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Exact category match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Exact location match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl SearchFilters {
    /// No filtering.
    pub fn none() -> Self {
        Self::default()
    }

    /// Restrict to one organization.
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Restrict to one category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restrict to one location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Whether no filter is set.
    pub fn is_empty(&self) -> bool {
        self.organization.is_none() && self.category.is_none() && self.location.is_none()
    }

    /// Evaluate the filters against a record.
    pub fn matches(&self, record: &CatalogRecord) -> bool {
        let org_ok = self
            .organization
            .as_ref()
            .is_none_or(|o| *o == record.key.organization);
        let cat_ok = self
            .category
            .as_ref()
            .is_none_or(|c| record.category.as_ref() == Some(c));
        let loc_ok = self
            .location
            .as_ref()
            .is_none_or(|l| record.location.as_ref() == Some(l));
        org_ok && cat_ok && loc_ok
    }
}

// ============================================================================
// Search outputs
// ============================================================================

/// A nearest-neighbor row returned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Record identifier.
    pub id: String,
    /// Grouping key.
    pub key: RecordKey,
    /// Cosine distance in `[0, 2]`.
    pub distance: f32,
}

/// A record's keyword list, as seen by keyword search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCandidate {
    /// Record identifier.
    pub id: String,
    /// Grouping key.
    pub key: RecordKey,
    /// Curated keywords.
    pub keywords: Vec<String>,
}

/// Which search path(s) matched a fused result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Only the semantic minimum was met.
    Semantic,
    /// Only the keyword minimum was met.
    Keyword,
    /// Both minimums were met.
    Both,
}

impl MatchType {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::Both => "both",
        }
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Record identifier.
    pub id: String,
    /// Grouping key.
    pub key: RecordKey,
    /// Semantic similarity in `[0, 1]` (0 when absent).
    pub semantic_score: f32,
    /// Keyword match score in `[0, 1]` (0 when absent).
    pub keyword_score: f32,
    /// Weighted fusion of the two scores.
    pub combined_score: f32,
    /// Provenance of the match.
    pub match_type: MatchType,
}

/// Results of a read API call plus timing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome<T> {
    /// Ranked results, best first.
    pub results: Vec<T>,
    /// Number of results returned.
    pub result_count: usize,
    /// Wall-clock processing time.
    pub processing_time_ms: u64,
}

impl<T> SearchOutcome<T> {
    /// Wrap results, measuring elapsed time since `started`.
    pub fn new(results: Vec<T>, started: Instant) -> Self {
        let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Self {
            result_count: results.len(),
            results,
            processing_time_ms,
        }
    }

    /// An empty outcome.
    pub fn empty(started: Instant) -> Self {
        Self::new(Vec::new(), started)
    }

    /// Whether there are no results.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
