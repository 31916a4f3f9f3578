//! Error types for Cartorio Core
//!
//! The coordination units never fail past their public methods; they report
//! failures as observable state. What remains are setup failures:
//! - configuration that cannot be read or is invalid
//! - malformed document identifiers
//! - a tracing subscriber that cannot be installed

use std::path::PathBuf;

/// Configuration loading and validation failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Path that was read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for the schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parsed but are out of range
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Dotted field name
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Main Cartorio error type
#[derive(Debug, thiserror::Error)]
pub enum CartorioError {
    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Document identifier is not a UUID
    #[error("invalid document id {value:?}: {source}")]
    InvalidDocumentId {
        /// Rejected input
        value: String,
        /// Parse error
        #[source]
        source: uuid::Error,
    },

    /// Tracing subscriber could not be installed
    #[error("telemetry init failed: {0}")]
    Telemetry(String),
}

/// Result type for Cartorio Core
pub type Result<T> = std::result::Result<T, CartorioError>;
