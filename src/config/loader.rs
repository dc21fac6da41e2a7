//! Configuration loader with layered sources
//!
//! Loads configuration from multiple sources with the following precedence
//! (highest to lowest):
//! 1. Environment variables (PERM_AUDITOR__*)
//! 2. Configuration file (TOML)
//! 3. Default values

use crate::config::types::AppConfig;
use crate::error::ConfigError;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Default configuration file paths to check (in order)
const DEFAULT_CONFIG_PATHS: &[&str] = &["perm-auditor.toml", ".perm-auditor.toml"];

/// Longest accepted settle delay
const MAX_SETTLE_MS: u64 = 10_000;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Load configuration from a TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from_str(toml_str, FileFormat::Toml))
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Load configuration from files and environment
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. Defaults come from serde defaults on AppConfig

    // 2. Configuration file
    if let Some(path) = config_path {
        let expanded = shellexpand::tilde(path);
        // Explicit path provided - must exist
        if !Path::new(expanded.as_ref()).exists() {
            return Err(ConfigError::Load(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        builder = builder.add_source(File::new(&expanded, FileFormat::Toml));
    } else if let Some(path) = default_config_paths().into_iter().find(|p| p.exists()) {
        builder = builder.add_source(File::new(&path.to_string_lossy(), FileFormat::Toml));
    }

    // 3. Environment variables, e.g. PERM_AUDITOR__SOURCE__SNAPSHOT
    // Double underscore (__) maps to nested keys (source.snapshot)
    builder = builder.add_source(
        Environment::with_prefix("PERM_AUDITOR")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// Candidate config files: working directory first, then the user config dir
fn default_config_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("perm-auditor").join("config.toml"));
    }
    paths
}

/// Validate configuration values
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.resolution.settle_ms > MAX_SETTLE_MS {
        return Err(ConfigError::Invalid {
            message: format!(
                "resolution.settle_ms must be at most {}, got: {}",
                MAX_SETTLE_MS, config.resolution.settle_ms
            ),
        });
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::Invalid {
            message: format!(
                "logging.level must be one of {}, got: {}",
                LOG_LEVELS.join(", "),
                config.logging.level
            ),
        });
    }

    validate_patterns(&config.objects.include, "objects.include")?;
    validate_patterns(&config.objects.exclude, "objects.exclude")?;

    Ok(())
}

/// Validate that all patterns are valid regex
fn validate_patterns(patterns: &[String], field_path: &str) -> Result<(), ConfigError> {
    for pattern in patterns {
        if let Err(e) = regex::Regex::new(pattern) {
            return Err(ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: format!("in {}: {}", field_path, e),
            });
        }
    }
    Ok(())
}
