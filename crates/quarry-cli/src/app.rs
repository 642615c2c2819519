//! The `quarry` application: logging setup, config loading, and command
//! dispatch.

use crate::cli::{CliArgs, Command};
use crate::{config, config_handlers, handlers};
use quarry::core::Result;
use quarry::{Quarry, QuarryConfig};
use tracing_subscriber::EnvFilter;

/// CLI application holding the resolved configuration.
pub struct QuarryCli {
    name: String,
    config: QuarryConfig,
    version: String,
}

impl QuarryCli {
    /// Create from CLI args, loading config from file/env.
    pub fn from_args(name: impl Into<String>, args: &CliArgs) -> Result<Self> {
        let config = config::load(args.config.as_deref())?;
        Ok(Self::new(name, config))
    }

    /// Create an application around an already-resolved config.
    pub fn new(name: impl Into<String>, config: QuarryConfig) -> Self {
        Self {
            name: name.into(),
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Override the version string.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Resolved configuration.
    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    /// Initialise tracing-based logging.
    ///
    /// Uses `RUST_LOG` if set, otherwise defaults based on verbosity flags.
    /// Library crates log through `log`; the subscriber's `tracing-log`
    /// bridge picks those records up.
    pub fn init_logging(&self, verbose: bool, quiet: bool) {
        let filter = if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else if quiet {
            EnvFilter::new("warn")
        } else if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        };

        // A subscriber may already be installed (tests).
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    }

    /// Run the CLI with the given arguments.
    ///
    /// Commands that touch the catalog connect with [`Quarry::connect`] and
    /// shut the service down afterwards, whether or not the command failed.
    pub async fn run(&self, args: CliArgs) -> Result<()> {
        self.init_logging(args.verbose, args.quiet);

        let command = match args.command {
            Some(Command::Version) => {
                println!("{} {}", self.name, self.version);
                return Ok(());
            }
            Some(Command::Config(config_cmd)) => {
                return config_handlers::handle_config_command(
                    args.config.as_deref(),
                    config_cmd.command,
                );
            }
            None => {
                println!("{} {}, use --help for usage", self.name, self.version);
                return Ok(());
            }
            Some(command) => command,
        };

        let quarry = Quarry::connect(self.config.clone()).await?;
        let result = self.dispatch(&quarry, command).await;
        quarry.shutdown().await;
        result
    }

    /// Run one catalog command against a connected service.
    pub async fn dispatch(&self, quarry: &Quarry, command: Command) -> Result<()> {
        match command {
            Command::Embed(args) => handlers::handle_embed(quarry, &args).await,
            Command::Stats => handlers::handle_stats(quarry).await,
            Command::Search(args) => handlers::handle_search(quarry, &args).await,
            Command::Similar { id, limit, json } => {
                handlers::handle_similar(quarry, &id, limit, json).await
            }
            Command::Index(index_cmd) => handlers::handle_index(quarry, index_cmd.command).await,
            Command::Version | Command::Config(_) => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
