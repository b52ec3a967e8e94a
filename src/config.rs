//! Engine Configuration
//!
//! Defines the configuration for the eligibility service:
//! - HTTP server binding
//! - Storage location
//! - Eligibility rules (quorum, minimum scores, aggregation)
//! - Accepted bearer tokens
//!
//! Values come from an optional TOML file, then environment overrides.

use crate::aggregator::AggregationRule;
use crate::auth::{is_valid_token_format, MIN_TOKEN_LEN};
use crate::classifier::DEFAULT_QUORUM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub eligibility: EligibilityConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/eligibility.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityConfig {
    /// Minimum population for MEDIAN/MEAN thresholds
    pub quorum: usize,
    /// Scores a worker needs before its accuracy counts
    pub min_scores_per_worker: usize,
    pub aggregation: AggregationRule,
    /// Run a recomputation after every accepted policy change
    pub recompute_on_policy_change: bool,
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            min_scores_per_worker: 1,
            aggregation: AggregationRule::Mean,
            recompute_on_policy_change: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted bearer tokens
    pub tokens: Vec<String>,
}

impl EngineConfig {
    /// Parse a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `ELIGIBILITY_*` environment overrides for settings that have no CLI flag
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(tokens) = std::env::var("ELIGIBILITY_API_TOKENS") {
            self.auth.tokens = tokens
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(quorum) = std::env::var("ELIGIBILITY_QUORUM") {
            self.eligibility.quorum = quorum
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("ELIGIBILITY_QUORUM: {}", quorum)))?;
        }
        if let Ok(min_scores) = std::env::var("ELIGIBILITY_MIN_SCORES") {
            self.eligibility.min_scores_per_worker = min_scores.parse().map_err(|_| {
                ConfigError::Invalid(format!("ELIGIBILITY_MIN_SCORES: {}", min_scores))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.eligibility.quorum == 0 {
            return Err(ConfigError::Invalid("quorum must be at least 1".to_string()));
        }
        if self.eligibility.min_scores_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "min_scores_per_worker must be at least 1".to_string(),
            ));
        }
        if let AggregationRule::RecencyWeighted { half_life } = self.eligibility.aggregation {
            if !(half_life.is_finite() && half_life > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "recency half_life must be positive, got {}",
                    half_life
                )));
            }
        }
        if self.auth.tokens.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one API token must be configured".to_string(),
            ));
        }
        if let Some(bad) = self
            .auth
            .tokens
            .iter()
            .position(|t| !is_valid_token_format(t))
        {
            return Err(ConfigError::Invalid(format!(
                "API token #{} must be at least {} printable characters",
                bad + 1,
                MIN_TOKEN_LEN
            )));
        }
        Ok(())
    }
}
