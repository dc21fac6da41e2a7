//! Configuration types for perm-auditor
//!
//! This module defines the configuration structure that can be loaded from
//! TOML files and/or environment variables.

use crate::error::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Where catalog, grant and assignment rows come from
    pub source: SourceConfig,

    /// Resolution run settings
    pub resolution: ResolutionConfig,

    /// Which objects are offered for auditing
    pub objects: ObjectFilterConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Permission source configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path to an exported snapshot (JSON or TOML)
    pub snapshot: Option<String>,
}

impl SourceConfig {
    /// The snapshot path, tilde-expanded
    pub fn require_snapshot(&self) -> Result<String, ConfigError> {
        match self.snapshot.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Ok(shellexpand::tilde(path).into_owned()),
            _ => Err(ConfigError::Missing {
                field: "source.snapshot (or pass --snapshot)".to_string(),
            }),
        }
    }
}

/// Resolution run configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Delay before folding starts, letting a caller settle after a
    /// selection change. Zero yields once instead of sleeping.
    pub settle_ms: u64,
}

impl ResolutionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Object include/exclude patterns (regex)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObjectFilterConfig {
    /// Only list objects matching one of these; empty lists everything
    pub include: Vec<String>,

    /// Never list objects matching one of these
    pub exclude: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output
    #[default]
    Pretty,
    /// JSON structured output
    Json,
}
