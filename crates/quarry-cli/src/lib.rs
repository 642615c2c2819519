//! Command-line interface for operating a Quarry deployment.
//!
//! - [`cli`]: clap argument and subcommand definitions
//! - [`config`]: `confyg`-based [`QuarryConfig`](quarry::QuarryConfig) loading
//! - [`config_handlers`]: `quarry config ...`
//! - [`handlers`]: embedding, search, and index commands
//! - [`app`]: logging setup and dispatch

pub mod app;
pub mod cli;
pub mod config;
pub mod config_handlers;
pub mod handlers;

pub use app::QuarryCli;
pub use cli::CliArgs;
