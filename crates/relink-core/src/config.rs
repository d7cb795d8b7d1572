//! Configuration management utilities

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_SCHEMA_VERSION: u32 = 6;
pub const DEFAULT_GIT_BRANCH: &str = "master";
pub const DEFAULT_SESSION_RETENTION_SECS: u64 = 3600;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {details}")]
    InvalidValue { key: String, details: String },
}

/// Settings that drive the import workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Upper bound for a single datasource connectivity probe
    pub probe_timeout_secs: u64,
    /// Newest bundle server schema version this build understands
    pub max_schema_version: u32,
    /// Branch tracked by Git-linked imports that do not name one
    pub default_git_branch: String,
    /// How long a finalized or cancelled import stays queryable
    pub session_retention_secs: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            max_schema_version: DEFAULT_MAX_SCHEMA_VERSION,
            default_git_branch: DEFAULT_GIT_BRANCH.to_string(),
            session_retention_secs: DEFAULT_SESSION_RETENTION_SECS,
        }
    }
}

impl ImportConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn session_retention(&self) -> Duration {
        Duration::from_secs(self.session_retention_secs)
    }

    pub fn with_session_retention(mut self, retention: Duration) -> Self {
        self.session_retention_secs = retention.as_secs();
        self
    }

    /// Load from `RELINK_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ImportConfig::from_env`] but reads through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("RELINK_PROBE_TIMEOUT_SECS") {
            config.probe_timeout_secs = parse_number(&raw, "RELINK_PROBE_TIMEOUT_SECS")?;
            if config.probe_timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "RELINK_PROBE_TIMEOUT_SECS".to_string(),
                    details: "must be greater than zero".to_string(),
                });
            }
        }
        if let Some(raw) = lookup("RELINK_MAX_SCHEMA_VERSION") {
            config.max_schema_version = parse_number(&raw, "RELINK_MAX_SCHEMA_VERSION")?;
        }
        if let Some(raw) = lookup("RELINK_SESSION_RETENTION_SECS") {
            config.session_retention_secs = parse_number(&raw, "RELINK_SESSION_RETENTION_SECS")?;
        }
        if let Some(branch) = lookup("RELINK_DEFAULT_GIT_BRANCH") {
            let branch = branch.trim();
            if !branch.is_empty() {
                config.default_git_branch = branch.to_string();
            }
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        details: e.to_string(),
    })
}

/// Server configuration assembled by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    /// 64 hex characters (or 32 raw bytes) used to encrypt stored credentials
    #[serde(skip_serializing)]
    pub encryption_key: String,
    pub import: ImportConfig,
}

impl ServerConfig {
    pub fn new(address: String, encryption_key: String, import: ImportConfig) -> Self {
        Self {
            address,
            encryption_key,
            import,
        }
    }
}
