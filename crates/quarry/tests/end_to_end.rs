//! End-to-end tests over the in-memory store and the deterministic mock
//! provider.
//!
//! The mock embeds text as a hashed bag of words, so records sharing words
//! with a query are closer to it than records that share none.

#![allow(clippy::unwrap_used)]

use quarry::core::{
    CatalogRecord, CatalogStore, Error, MatchType, MemoryCatalogStore, SearchFilters, SearchResult,
};
use quarry::index::IndexState;
use quarry::pipeline::Selector;
use quarry::search::HybridOptions;
use quarry::vector::MockEmbeddingProvider;
use quarry::{Components, Quarry, QuarryConfig};
use std::sync::Arc;

const DIM: usize = 2048;

fn catalog() -> Vec<CatalogRecord> {
    vec![
        CatalogRecord::new("mit-cs", "MIT", "Computer Science")
            .with_category("engineering")
            .with_location("Cambridge")
            .with_description("Undergraduate and graduate research in computing")
            .with_keywords([
                "computer science",
                "artificial intelligence",
                "machine learning",
                "research",
            ]),
        CatalogRecord::new("mit-arch", "MIT", "Architecture")
            .with_category("design")
            .with_location("Cambridge")
            .with_description("Studio-based design education")
            .with_keywords(["architecture", "urban design"]),
        CatalogRecord::new("harvard-hist", "Harvard", "History")
            .with_category("humanities")
            .with_location("Cambridge")
            .with_description("Archival study of early modern Europe")
            .with_keywords(["history", "archives"]),
        CatalogRecord::new("stanford-stats", "Stanford", "Statistics")
            .with_category("quantitative")
            .with_location("Palo Alto")
            .with_description("Survey design for the social sciences")
            .with_keywords(["research methods", "survey sampling"]),
    ]
}

struct Harness {
    quarry: Quarry,
    provider: Arc<MockEmbeddingProvider>,
    store: Arc<MemoryCatalogStore>,
}

async fn harness() -> Harness {
    let mut config = QuarryConfig::default();
    config.embedding.provider = "mock".into();
    config.embedding.dimension = DIM;

    let provider = Arc::new(MockEmbeddingProvider::new(DIM));
    let store = Arc::new(MemoryCatalogStore::with_records(catalog()));
    let components = Components::in_memory(provider.clone()).with_store(store.clone());
    let quarry = Quarry::from_components(config, components).unwrap();

    let report = quarry.embed(&Selector::AllMissing).await.unwrap();
    assert_eq!(report.success_count, 4);
    assert_eq!(report.failed_count, 0);

    Harness {
        quarry,
        provider,
        store,
    }
}

#[tokio::test]
async fn test_hybrid_ranks_relevant_record_first() {
    let h = harness().await;
    let options =
        HybridOptions::from_config(&h.quarry.config().search, 5).with_weights(0.7, 0.3);

    let outcome = h
        .quarry
        .hybrid_search("mit computer science ai research", &options)
        .await
        .unwrap();

    assert!(!outcome.is_empty());
    assert_eq!(outcome.result_count, outcome.results.len());
    assert!(outcome.result_count <= 5);

    let top = &outcome.results[0];
    assert_eq!(top.id, "mit-cs");
    assert_eq!(top.match_type, MatchType::Both);
    assert!(top.keyword_score > 0.5);

    // Shares only "research" with the query.
    let tangential = outcome
        .results
        .iter()
        .find(|r| r.id == "stanford-stats")
        .unwrap();
    assert_eq!(tangential.match_type, MatchType::Keyword);
    assert_eq!(tangential.keyword_score, 0.25);
    assert!(tangential.combined_score < top.combined_score);

    let position = |id: &str| outcome.results.iter().position(|r| r.id == id);
    assert!(position("mit-cs").unwrap() < position("stanford-stats").unwrap());
    assert!(position("mit-arch").is_none());
    for pair in outcome.results.windows(2) {
        assert!(pair[0].combined_score >= pair[1].combined_score);
    }
}

#[tokio::test]
async fn test_smart_search_uses_default_weights() {
    let h = harness().await;
    let smart = h
        .quarry
        .smart_search("computer science research", 3, &SearchFilters::none())
        .await
        .unwrap();
    let explicit = h
        .quarry
        .hybrid_search(
            "computer science research",
            &HybridOptions::from_config(&h.quarry.config().search, 3),
        )
        .await
        .unwrap();

    let ids = |results: &[SearchResult]| {
        results.iter().map(|r| r.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&smart.results), ids(&explicit.results));
    assert_eq!(smart.results[0].id, "mit-cs");
}

#[tokio::test]
async fn test_invalid_weights_fail_before_any_provider_call() {
    let h = harness().await;
    let calls = h.provider.call_count();
    let options = HybridOptions::default().with_weights(0.8, 0.3);

    let err = h
        .quarry
        .hybrid_search("anything at all", &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.provider.call_count(), calls);
}

#[tokio::test]
async fn test_semantic_search_with_filters() {
    let h = harness().await;
    let outcome = h
        .quarry
        .semantic_search(
            "history archives",
            10,
            &SearchFilters::none().with_organization("Harvard"),
            Some(0.0),
        )
        .await
        .unwrap();

    assert_eq!(outcome.result_count, 1);
    assert_eq!(outcome.results[0].id, "harvard-hist");
    assert!(outcome.results[0].similarity > 0.5);
}

#[tokio::test]
async fn test_semantic_search_empty_query_is_validation_error() {
    let h = harness().await;
    let err = h
        .quarry
        .semantic_search("   ", 5, &SearchFilters::none(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_find_similar_excludes_self() {
    let h = harness().await;
    let outcome = h.quarry.find_similar("mit-cs", 5).await.unwrap();

    assert_eq!(outcome.result_count, 3);
    assert!(outcome.results.iter().all(|hit| hit.id != "mit-cs"));
    for pair in outcome.results.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[tokio::test]
async fn test_find_similar_not_found() {
    let h = harness().await;
    let err = h.quarry.find_similar("ghost", 5).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let fresh = h
        .store
        .upsert(CatalogRecord::new("", "Yale", "Music"))
        .await
        .unwrap();
    let err = h.quarry.find_similar(&fresh, 5).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_embedding_stats_track_new_records() {
    let h = harness().await;
    let stats = h.quarry.embedding_stats().await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.percent_complete, 100.0);
    assert_eq!(stats.provider, "mock");

    h.store
        .upsert(CatalogRecord::new("", "Yale", "Music").with_keywords(["music"]))
        .await
        .unwrap();
    let stats = h.quarry.embedding_stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.percent_complete, 80.0);

    let report = h.quarry.embed(&Selector::AllMissing).await.unwrap();
    assert_eq!(report.success_count, 1);
    assert_eq!(h.quarry.embedding_stats().await.unwrap().pending, 0);
}

#[tokio::test]
async fn test_index_lifecycle_through_service() {
    let h = harness().await;

    let report = h.quarry.index_health_report().await.unwrap();
    assert!(!report.has_index);
    assert!(
        report
            .recommendations
            .iter()
            .any(|r| r.contains("No vector index"))
    );

    h.quarry.index().create().await.unwrap();
    assert_eq!(
        h.quarry.index().wait_for_build().await.unwrap(),
        IndexState::Valid
    );
    h.quarry.index().analyze().await.unwrap();

    let report = h.quarry.index_health_report().await.unwrap();
    assert!(report.has_index);
    assert_eq!(report.state, IndexState::Valid);
    assert!(report.recommendations.is_empty(), "{:?}", report.recommendations);

    let err = h.quarry.index().create().await.unwrap_err();
    assert!(matches!(err, Error::IndexState(_)));
}

#[tokio::test]
async fn test_monitoring_export_reflects_traffic() {
    let h = harness().await;
    for _ in 0..3 {
        h.quarry
            .smart_search("machine learning", 5, &SearchFilters::none())
            .await
            .unwrap();
    }

    let export = h.quarry.export_metrics_for_monitoring();
    assert!(export["search.sample_count"] >= 3.0);
    assert!(export["operation.hybrid_search.count"] >= 3.0);
    // First query misses the local tier; the two repeats hit it.
    assert!(export["cache.local.hits"] >= 2.0);

    let perf = h.quarry.metrics().get_performance(5);
    assert!(perf.cache_hit_rate > 0.0);
}
