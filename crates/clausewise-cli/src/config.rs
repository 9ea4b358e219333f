//! `clausewise.toml` configuration.
//!
//! Values resolve in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Config file (`--config` or `CLAUSEWISE_CONFIG`)
//! 3. Command-line flags
//!
//! ```toml
//! [decision]
//! threshold = 0.75
//! unresolved_penalty = 0.5
//! precedence = ["exclusion", "unresolved", "coverage"]
//!
//! [search]
//! top_k = 5
//!
//! [embedder]
//! url = "http://localhost:8080"
//! model = "all-MiniLM-L6-v2"
//! timeout_ms = 2000
//!
//! [synonyms.procedure]
//! "tkr" = "knee replacement"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use clausewise_ai::{DecisionPolicy, RetryPolicy};
use clausewise_core::{SynonymOverrides, SynonymTables};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub decision: DecisionPolicy,
    pub search: SearchConfig,
    pub embedder: EmbedderConfig,
    pub synonyms: SynonymOverrides,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbedderConfig {
    pub url: String,
    pub model: String,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            timeout_ms: 2000,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
        }
    }
}

impl Config {
    /// Load from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Check every value once, before anything runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decision
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.search.top_k == 0 {
            return Err(ConfigError::Invalid("search.top_k must be at least 1".into()));
        }
        if self.embedder.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "embedder.max_attempts must be at least 1".into(),
            ));
        }
        if self.embedder.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "embedder.timeout_ms must be positive".into(),
            ));
        }
        if self.embedder.url.trim().is_empty() {
            return Err(ConfigError::Invalid("embedder.url is empty".into()));
        }
        self.synonym_tables()?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.embedder.max_attempts,
            timeout: Duration::from_millis(self.embedder.timeout_ms),
            initial_backoff: Duration::from_millis(self.embedder.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.embedder.max_backoff_ms),
        }
    }

    /// Built-in synonym tables extended with the `[synonyms]` section.
    pub fn synonym_tables(&self) -> Result<SynonymTables, ConfigError> {
        SynonymTables::builtin()
            .with_overrides(&self.synonyms)
            .map_err(|e| ConfigError::Invalid(format!("synonyms: {e}")))
    }
}
