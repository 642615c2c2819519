//! Handler functions for `quarry config {path,get,init,export}`.

use crate::cli::ConfigAction;
use crate::config;
use quarry::QuarryConfig;
use quarry::core::{Error, Result};
use std::path::PathBuf;

/// Handle a config subcommand.
///
/// Receives the raw `--config` path (not a loaded config) because `path`
/// and `init` work before a config file exists.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => cmd_config_path(config_path),
        ConfigAction::Get { key } => cmd_config_get(config_path, &key),
        ConfigAction::Init { file, force } => cmd_config_init(file.as_deref(), force),
        ConfigAction::Export { docker_env } => {
            let config = config::load(config_path)?;
            cmd_config_export(&config, docker_env)
        }
    }
}

fn cmd_config_path(config_path: Option<&str>) -> Result<()> {
    match config::resolve_config_path(config_path) {
        Some(path) => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("(file does not exist, run `quarry config init` to create it)");
            }
            Ok(())
        }
        None => Err(Error::config(
            "Could not determine config directory for this platform",
        )),
    }
}

fn cmd_config_get(config_path: Option<&str>, key: &str) -> Result<()> {
    let config = config::load(config_path)?;
    println!("{}", lookup(&config, key)?);
    Ok(())
}

/// Resolve a dotted key against the loaded config. Secrets are masked.
fn lookup(config: &QuarryConfig, key: &str) -> Result<String> {
    if key == "embedding.api_key" && config.embedding.api_key.is_some() {
        return Ok(config::MASK.to_string());
    }
    let value = toml::Value::try_from(config).map_err(|e| Error::config(e.to_string()))?;
    get_nested_value(&value, key)
        .map(format_toml_value)
        .ok_or_else(|| Error::config(format!("Key '{key}' not found in configuration")))
}

fn cmd_config_init(file: Option<&str>, force: bool) -> Result<()> {
    let path = match file {
        Some(p) => PathBuf::from(p),
        None => config::default_config_path()
            .ok_or_else(|| Error::config("Could not determine config directory"))?,
    };

    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, config::to_toml_string(&QuarryConfig::default())?)?;

    println!("Config file created at {}", path.display());
    Ok(())
}

fn cmd_config_export(config: &QuarryConfig, docker_env: bool) -> Result<()> {
    for (key, value) in config::to_env_vars(config)? {
        if docker_env {
            println!("--env {key}={value}");
        } else {
            println!("{key}={value}");
        }
    }
    Ok(())
}

// ============================================================================
// TOML dotted-key helpers
// ============================================================================

fn get_nested_value<'a>(value: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    key.split('.')
        .try_fold(value, |current, part| current.as_table()?.get(part))
}

fn format_toml_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Datetime(dt) => dt.to_string(),
        toml::Value::Array(_) | toml::Value::Table(_) => {
            toml::to_string_pretty(value).unwrap_or_else(|_| format!("{value:?}"))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
