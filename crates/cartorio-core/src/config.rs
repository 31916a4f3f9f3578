//! Workspace configuration
//!
//! ```toml
//! [persistence]
//! debounce_ms = 500
//! enabled = true
//!
//! [profile]
//! cache_key = "cartorio.profile"
//! ttl_ms = 300000
//! retry_delays_ms = [500, 1000, 2000]
//!
//! [pipeline]
//! ordering = "last_wins"
//! channel_prefix = "document-status"
//! ```
//!
//! Every section and field is optional; unknown fields are rejected.

use crate::error::ConfigError;
use cartorio_fetch::FetchConfig;
use cartorio_persist::SaveQueueConfig;
use cartorio_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration of every coordination unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CartorioConfig {
    /// Field save queue
    pub persistence: SaveQueueConfig,
    /// Profile fetch and cache
    pub profile: FetchConfig,
    /// Processing state machine
    pub pipeline: PipelineConfig,
}

impl CartorioConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With persistence section
    #[inline]
    #[must_use]
    pub fn with_persistence(mut self, persistence: SaveQueueConfig) -> Self {
        self.persistence = persistence;
        self
    }

    /// With profile section
    #[inline]
    #[must_use]
    pub fn with_profile(mut self, profile: FetchConfig) -> Self {
        self.profile = profile;
        self
    }

    /// With pipeline section
    #[inline]
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.ttl_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "profile.ttl_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.profile.cache_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "profile.cache_key",
                reason: "must not be empty".to_string(),
            });
        }
        if self.pipeline.channel_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "pipeline.channel_prefix",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
