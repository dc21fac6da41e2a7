//! Error types for perm-auditor
//!
//! This module defines the error hierarchy used throughout the crate.
//! Row-level problems never appear here: they are dropped and counted by the
//! normalizer. What remains are catalog-level integrity failures, source
//! failures and configuration failures.

use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Permission source error: {0}")]
    Source(#[from] SourceError),

    #[error("Data integrity error: {0}")]
    Integrity(#[from] DataIntegrityError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(String),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors raised by a permission source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read snapshot '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse snapshot '{path}': {reason}")]
    Parse { path: String, reason: String },

    #[error("Unknown object: {0}")]
    UnknownObject(String),

    #[error("Unknown field '{field}' on object '{object}'")]
    UnknownField { object: String, field: String },
}

/// A catalog entry is structurally malformed.
///
/// Raised when a field descriptor or principal is missing required metadata.
/// The affected run is aborted; no partial result is published.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataIntegrityError {
    #[error("field '{object}.{field}' is malformed: missing {missing}")]
    MalformedField {
        object: String,
        field: String,
        missing: &'static str,
    },

    #[error("principal '{id}' is malformed: missing {missing}")]
    MalformedPrincipal { id: String, missing: &'static str },
}

impl DataIntegrityError {
    pub fn malformed_field(
        object: impl Into<String>,
        field: impl Into<String>,
        missing: &'static str,
    ) -> Self {
        Self::MalformedField {
            object: object.into(),
            field: field.into(),
            missing,
        }
    }

    pub fn malformed_principal(id: impl Into<String>, missing: &'static str) -> Self {
        Self::MalformedPrincipal {
            id: id.into(),
            missing,
        }
    }

    /// Short user-facing message naming the offending object/field or principal
    pub fn user_message(&self) -> String {
        match self {
            Self::MalformedField { object, field, .. } => format!(
                "Field catalog for '{}' is inconsistent at field '{}'; no permissions shown",
                object, field
            ),
            Self::MalformedPrincipal { id, .. } => format!(
                "Principal catalog is inconsistent at '{}'; no permissions shown",
                id
            ),
        }
    }
}

/// A run was superseded before it could publish.
///
/// Not a failure: it only tells the caller that a newer run owns the view.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("run {generation} superseded by run {superseded_by}")]
pub struct StaleRunDiscarded {
    pub generation: u64,
    pub superseded_by: u64,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type alias for permission source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;
