//! Handlers for the operational commands: `embed`, `stats`, `search`,
//! `similar`, and `index`.
//!
//! Each handler prints to stdout. Rendering lives in plain functions that
//! return strings so output can be checked without capturing stdout.

use crate::cli::{EmbedArgs, IndexAction, SearchArgs, SearchMode};
use quarry::core::{Error, Result, SearchFilters, SearchOutcome, SearchResult};
use quarry::index::{HealthReport, IndexState};
use quarry::pipeline::{BatchReport, Selector};
use quarry::search::{HybridOptions, KeywordHit};
use quarry::vector::SemanticHit;
use quarry::{EmbeddingStats, Quarry};
use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;

/// Interval between build-progress log lines while waiting on an index.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

// ============================================================================
// embed / stats
// ============================================================================

/// Map `embed` flags to a pipeline selector.
pub fn selector(args: &EmbedArgs) -> Result<Selector> {
    if args.missing {
        Ok(Selector::AllMissing)
    } else if let Some(ids) = &args.ids {
        Ok(Selector::ids(ids.iter().map(|id| id.trim()).filter(|id| !id.is_empty())))
    } else if let Some(days) = args.stale_days {
        Ok(Selector::StaleOlderThan { days })
    } else {
        Err(Error::validation(
            "one of --missing, --ids or --stale-days is required",
        ))
    }
}

/// Run the batch pipeline.
pub async fn handle_embed(quarry: &Quarry, args: &EmbedArgs) -> Result<()> {
    let report = quarry.embed(&selector(args)?).await?;
    print!("{}", render_report(&report));
    Ok(())
}

/// Print embedding coverage.
pub async fn handle_stats(quarry: &Quarry) -> Result<()> {
    let stats = quarry.embedding_stats().await?;
    print!("{}", render_stats(&stats));
    Ok(())
}

/// Human-readable batch report.
pub fn render_report(report: &BatchReport) -> String {
    let mut out = format!(
        "Embedded {} record(s), {} failed, {} chunk(s) in {} ms\n",
        report.success_count, report.failed_count, report.chunks_processed, report.duration_ms
    );
    for error in &report.errors {
        let _ = writeln!(out, "  {}: {}", error.id, error.message);
    }
    out
}

/// Human-readable coverage summary.
pub fn render_stats(stats: &EmbeddingStats) -> String {
    format!(
        "Records:        {}\n\
         With embedding: {}\n\
         Pending:        {}\n\
         Complete:       {:.1}%\n\
         Cached locally: {}\n\
         Provider:       {} ({})\n",
        stats.total,
        stats.with_embedding,
        stats.pending,
        stats.percent_complete,
        stats.local_cache_entries,
        stats.provider,
        stats.model_tag
    )
}

// ============================================================================
// search / similar
// ============================================================================

/// Filters named by the search flags.
pub fn filters(args: &SearchArgs) -> SearchFilters {
    let mut filters = SearchFilters::none();
    if let Some(org) = &args.organization {
        filters = filters.with_organization(org);
    }
    if let Some(category) = &args.category {
        filters = filters.with_category(category);
    }
    if let Some(location) = &args.location {
        filters = filters.with_location(location);
    }
    filters
}

/// Hybrid options for `--mode hybrid`. A single weight implies the other.
pub fn hybrid_options(quarry: &Quarry, args: &SearchArgs) -> HybridOptions {
    let options =
        HybridOptions::from_config(&quarry.config().search, args.limit).with_filters(filters(args));
    match (args.semantic_weight, args.keyword_weight) {
        (Some(s), Some(k)) => options.with_weights(s, k),
        (Some(s), None) => options.with_weights(s, 1.0 - s),
        (None, Some(k)) => options.with_weights(1.0 - k, k),
        (None, None) => options,
    }
}

/// Run a search in the requested mode.
pub async fn handle_search(quarry: &Quarry, args: &SearchArgs) -> Result<()> {
    let query = args.query.as_str();
    let output = match args.mode {
        SearchMode::Semantic => {
            let outcome = quarry
                .semantic_search(query, args.limit, &filters(args), None)
                .await?;
            emit(&outcome, args.json, render_semantic)?
        }
        SearchMode::Keyword => {
            let outcome = quarry
                .keyword_search(query, args.limit, &filters(args))
                .await?;
            emit(&outcome, args.json, render_keyword)?
        }
        SearchMode::Hybrid => {
            let outcome = quarry
                .hybrid_search(query, &hybrid_options(quarry, args))
                .await?;
            emit(&outcome, args.json, render_hybrid)?
        }
        SearchMode::Smart => {
            let outcome = quarry
                .smart_search(query, args.limit, &filters(args))
                .await?;
            emit(&outcome, args.json, render_hybrid)?
        }
    };
    print!("{output}");
    Ok(())
}

/// List records similar to `id`.
pub async fn handle_similar(quarry: &Quarry, id: &str, limit: usize, json: bool) -> Result<()> {
    let outcome = quarry.find_similar(id, limit).await?;
    print!("{}", emit(&outcome, json, render_semantic)?);
    Ok(())
}

fn emit<T: Serialize>(
    outcome: &SearchOutcome<T>,
    json: bool,
    render: fn(&SearchOutcome<T>) -> String,
) -> Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(outcome)?;
        out.push('\n');
        Ok(out)
    } else {
        Ok(render(outcome))
    }
}

fn footer(count: usize, ms: u64) -> String {
    format!("{count} result(s) in {ms} ms\n")
}

/// Table of semantic hits.
pub fn render_semantic(outcome: &SearchOutcome<SemanticHit>) -> String {
    let mut out = String::new();
    for (rank, hit) in outcome.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {:<24} {:<48} similarity {:.3}",
            rank + 1,
            hit.id,
            hit.key.to_string(),
            hit.similarity
        );
    }
    out.push_str(&footer(outcome.result_count, outcome.processing_time_ms));
    out
}

/// Table of keyword hits.
pub fn render_keyword(outcome: &SearchOutcome<KeywordHit>) -> String {
    let mut out = String::new();
    for (rank, hit) in outcome.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {:<24} {:<48} score {:.3}",
            rank + 1,
            hit.id,
            hit.key.to_string(),
            hit.score
        );
    }
    out.push_str(&footer(outcome.result_count, outcome.processing_time_ms));
    out
}

/// Table of fused results.
pub fn render_hybrid(outcome: &SearchOutcome<SearchResult>) -> String {
    let mut out = String::new();
    for (rank, result) in outcome.results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>3}. {:<24} {:<48} combined {:.3} (semantic {:.3}, keyword {:.3}, {})",
            rank + 1,
            result.id,
            result.key.to_string(),
            result.combined_score,
            result.semantic_score,
            result.keyword_score,
            result.match_type.as_str()
        );
    }
    out.push_str(&footer(outcome.result_count, outcome.processing_time_ms));
    out
}

// ============================================================================
// index
// ============================================================================

/// Dispatch an index subcommand.
pub async fn handle_index(quarry: &Quarry, action: IndexAction) -> Result<()> {
    let index = quarry.index();
    match action {
        IndexAction::Create => {
            index.create().await?;
            let state = wait_with_progress(quarry).await?;
            println!("Index '{}' is {state}", index.config().name);
        }
        IndexAction::Rebuild => {
            index.rebuild().await?;
            let state = wait_with_progress(quarry).await?;
            println!("Index '{}' rebuilt, now {state}", index.config().name);
        }
        IndexAction::Drop => {
            index.drop().await?;
            println!("Index '{}' dropped", index.config().name);
        }
        IndexAction::Health { json } => {
            let report = quarry.index_health_report().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_health(&index.config().name, &report));
            }
        }
        IndexAction::Analyze => {
            index.analyze().await?;
            println!("Statistics refreshed");
        }
        IndexAction::Vacuum { full } => {
            index.vacuum(full).await?;
            println!("Vacuum{} complete", if full { " (full)" } else { "" });
        }
    }
    Ok(())
}

/// Block until the in-flight build finishes, logging progress periodically.
///
/// The process must outlive the build: dropping the connection cancels a
/// concurrent build on the server.
pub async fn wait_with_progress(quarry: &Quarry) -> Result<IndexState> {
    let index = quarry.index();
    let wait = index.wait_for_build();
    tokio::pin!(wait);

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            state = &mut wait => return state,
            _ = ticker.tick() => {
                if let Some(progress) = index.build_progress().await? {
                    tracing::info!(
                        phase = %progress.phase,
                        percent = progress.percent,
                        "Index build in progress"
                    );
                }
            }
        }
    }
}

/// Human-readable health report.
pub fn render_health(name: &str, report: &HealthReport) -> String {
    let mut out = format!("Index:   {name}\nState:   {}\n", report.state);
    if let Some(index) = &report.index {
        let _ = writeln!(out, "Size:    {} bytes", index.size_bytes);
        if let Some(params) = &index.params {
            let _ = writeln!(
                out,
                "Params:  m={} ef_construction={}",
                params.m, params.ef_construction
            );
        }
    }
    if let Some(progress) = &report.build_progress {
        let _ = writeln!(out, "Build:   {} ({:.1}%)", progress.phase, progress.percent);
    }
    let _ = writeln!(
        out,
        "Tuples:  {} live, {} dead",
        report.stats.live_tuples, report.stats.dead_tuples
    );
    match report.stats.last_analyze {
        Some(at) => {
            let _ = writeln!(out, "Analyze: {}", at.to_rfc3339());
        }
        None => out.push_str("Analyze: never\n"),
    }
    if report.recommendations.is_empty() {
        out.push_str("No recommendations\n");
    } else {
        out.push_str("Recommendations:\n");
        for rec in &report.recommendations {
            let _ = writeln!(out, "  - {rec}");
        }
    }
    out
}

// ============================================================================
// Tests
// ============================================================================
