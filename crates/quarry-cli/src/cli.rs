//! CLI argument parsing and command definitions.
//!
//! One binary, `quarry`, covering the operational surface: batch embedding,
//! ad-hoc searches, index lifecycle, and configuration management.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "quarry", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "QUARRY_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate embeddings for a selection of records.
    Embed(EmbedArgs),

    /// Show embedding coverage.
    Stats,

    /// Run a search query.
    Search(SearchArgs),

    /// List records most similar to an existing record.
    Similar {
        /// Record identifier.
        id: String,

        /// Maximum number of results.
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Approximate index operations.
    Index(IndexCommand),

    /// Configuration operations.
    Config(ConfigCommand),

    /// Print version information.
    Version,
}

/// Record selection for `embed`. Exactly one option is required.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct EmbedArgs {
    /// Every record without an embedding.
    #[arg(long)]
    pub missing: bool,

    /// Explicit record ids, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<String>>,

    /// Records embedded more than this many days ago (or never).
    #[arg(long)]
    pub stale_days: Option<u32>,
}

/// Search strategy.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
    /// Vector similarity only.
    Semantic,
    /// Keyword lists only.
    Keyword,
    /// Weighted fusion with explicit weights.
    Hybrid,
    /// Weighted fusion with the configured weights.
    #[default]
    Smart,
}

/// Arguments for `search`.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Free-text query.
    pub query: String,

    /// Search strategy.
    #[arg(short, long, value_enum, default_value_t = SearchMode::Smart)]
    pub mode: SearchMode,

    /// Maximum number of results.
    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Restrict to one organization.
    #[arg(long)]
    pub organization: Option<String>,

    /// Restrict to one category.
    #[arg(long)]
    pub category: Option<String>,

    /// Restrict to one location.
    #[arg(long)]
    pub location: Option<String>,

    /// Semantic weight for `--mode hybrid`.
    #[arg(long)]
    pub semantic_weight: Option<f32>,

    /// Keyword weight for `--mode hybrid`.
    #[arg(long)]
    pub keyword_weight: Option<f32>,

    /// Print results as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Index-specific subcommands.
#[derive(Parser, Debug)]
pub struct IndexCommand {
    /// Index subcommand to execute.
    #[command(subcommand)]
    pub command: IndexAction,
}

/// Available index subcommands.
#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// Build the index and wait for it to become valid.
    Create,

    /// Drop the index.
    Drop,

    /// Drop and rebuild the index.
    Rebuild,

    /// Show state, statistics, and recommendations.
    Health {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Refresh planner statistics.
    Analyze,

    /// Reclaim dead tuples.
    Vacuum {
        /// Rewrite the whole table (takes an exclusive lock).
        #[arg(long)]
        full: bool,
    },
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Get a configuration value by dotted key.
    Get {
        /// Dotted key (e.g., "search.semantic_weight").
        key: String,
    },

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },

    /// Export configuration as environment variables.
    Export {
        /// Format as Docker --env flags.
        #[arg(long)]
        docker_env: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_args_default() {
        let args = CliArgs::parse_from(["quarry"]);
        assert!(!args.verbose);
        assert!(!args.quiet);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_cli_args_config() {
        let args = CliArgs::parse_from(["quarry", "--config", "/path/to/config.toml"]);
        assert_eq!(args.config, Some("/path/to/config.toml".to_string()));
    }

    #[test]
    fn test_embed_missing() {
        let args = CliArgs::parse_from(["quarry", "embed", "--missing"]);
        match args.command {
            Some(Command::Embed(embed)) => {
                assert!(embed.missing);
                assert!(embed.ids.is_none());
                assert!(embed.stale_days.is_none());
            }
            _ => panic!("Expected Embed command"),
        }
    }

    #[test]
    fn test_embed_ids_are_comma_separated() {
        let args = CliArgs::parse_from(["quarry", "embed", "--ids", "a,b,c"]);
        match args.command {
            Some(Command::Embed(embed)) => {
                assert_eq!(embed.ids.unwrap(), vec!["a", "b", "c"]);
            }
            _ => panic!("Expected Embed command"),
        }
    }

    #[test]
    fn test_embed_requires_exactly_one_selection() {
        assert!(CliArgs::try_parse_from(["quarry", "embed"]).is_err());
        assert!(
            CliArgs::try_parse_from(["quarry", "embed", "--missing", "--stale-days", "30"])
                .is_err()
        );
    }

    #[test]
    fn test_search_defaults() {
        let args = CliArgs::parse_from(["quarry", "search", "machine learning"]);
        match args.command {
            Some(Command::Search(search)) => {
                assert_eq!(search.query, "machine learning");
                assert_eq!(search.mode, SearchMode::Smart);
                assert_eq!(search.limit, 10);
                assert!(!search.json);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_search_hybrid_with_weights() {
        let args = CliArgs::parse_from([
            "quarry",
            "search",
            "robotics",
            "--mode",
            "hybrid",
            "--semantic-weight",
            "0.6",
            "--keyword-weight",
            "0.4",
            "--organization",
            "MIT",
        ]);
        match args.command {
            Some(Command::Search(search)) => {
                assert_eq!(search.mode, SearchMode::Hybrid);
                assert_eq!(search.semantic_weight, Some(0.6));
                assert_eq!(search.keyword_weight, Some(0.4));
                assert_eq!(search.organization.as_deref(), Some("MIT"));
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_similar_command() {
        let args = CliArgs::parse_from(["quarry", "similar", "rec-1", "--limit", "3"]);
        match args.command {
            Some(Command::Similar { id, limit, json }) => {
                assert_eq!(id, "rec-1");
                assert_eq!(limit, 3);
                assert!(!json);
            }
            _ => panic!("Expected Similar command"),
        }
    }

    #[test]
    fn test_index_vacuum_full() {
        let args = CliArgs::parse_from(["quarry", "index", "vacuum", "--full"]);
        match args.command {
            Some(Command::Index(IndexCommand {
                command: IndexAction::Vacuum { full },
            })) => assert!(full),
            _ => panic!("Expected Index Vacuum command"),
        }
    }

    #[test]
    fn test_index_health_command() {
        let args = CliArgs::parse_from(["quarry", "index", "health"]);
        assert!(matches!(
            args.command,
            Some(Command::Index(IndexCommand {
                command: IndexAction::Health { json: false }
            }))
        ));
    }

    #[test]
    fn test_config_init_force() {
        let args = CliArgs::parse_from(["quarry", "config", "init", "--force"]);
        match args.command {
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Init { file, force },
            })) => {
                assert!(file.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }

    #[test]
    fn test_config_export_docker_env() {
        let args = CliArgs::parse_from(["quarry", "config", "export", "--docker-env"]);
        assert!(matches!(
            args.command,
            Some(Command::Config(ConfigCommand {
                command: ConfigAction::Export { docker_env: true }
            }))
        ));
    }

    #[test]
    fn test_version_command() {
        let args = CliArgs::parse_from(["quarry", "version"]);
        assert!(matches!(args.command, Some(Command::Version)));
    }
}
