//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::{AppConfig, StoreBackend};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate.
///
/// Without a file every section takes its defaults.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => AppConfig::default(),
    };

    apply_overrides(&mut config, |name| std::env::var(name).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Environment variables understood on top of the file:
///
/// - `REDIS_CACHE_URL` / `REDIS_RATELIMIT_URL`: store URLs
/// - `DISABLE_REDIS=true`: use the in-process store
pub fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("REDIS_CACHE_URL") {
        config.store.cache_url = url;
    }
    if let Some(url) = lookup("REDIS_RATELIMIT_URL") {
        config.store.ratelimit_url = url;
    }
    if lookup("DISABLE_REDIS").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        tracing::warn!("DISABLE_REDIS set, using in-process counter store");
        config.store.backend = StoreBackend::Memory;
    }
}
