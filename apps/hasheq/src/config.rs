//! # Configuration
//!
//! Layered configuration for the hasheq binary:
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. environment overrides (`HASHEQ_*`)
//! 4. command-line flags, applied by the CLI
//!
//! ```toml
//! database = "hasheq.redb"
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 25
//! max_backoff_ms = 1000
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! request_timeout_ms = 5000
//! rate_limit = 100
//! ```
//!
//! `HASHEQ_API_KEY` and `HASHEQ_CORS_ORIGINS` are read by the API layer
//! directly and never stored in the file.

use crate::error::AppError;
use hasheq_core::RetryPolicy;
use hasheq_core::primitives::{
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum size of a configuration file (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// CONFIG SECTIONS
// =============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the redb database.
    pub database: PathBuf,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("hasheq.redb"),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Whole-operation retry settings for transient store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        if self.max_attempts <= 1 {
            return RetryPolicy::none();
        }
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Deadline applied to every request, in milliseconds.
    pub request_timeout_ms: u64,
    /// Requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_ms: 5000,
            rate_limit: 100,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// LOADING
// =============================================================================

impl Config {
    /// Load defaults, then `path` (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            AppError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(AppError::Config(format!(
                "'{}' is {} bytes, maximum is {} bytes",
                path.display(),
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, AppError> {
        toml::from_str(text).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Apply `HASHEQ_*` overrides obtained through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), AppError> {
        if let Some(database) = lookup("HASHEQ_DATABASE") {
            self.database = PathBuf::from(database);
        }
        if let Some(rate) = lookup("HASHEQ_RATE_LIMIT") {
            self.server.rate_limit = parse_env("HASHEQ_RATE_LIMIT", &rate)?;
        }
        if let Some(timeout) = lookup("HASHEQ_REQUEST_TIMEOUT_MS") {
            self.server.request_timeout_ms = parse_env("HASHEQ_REQUEST_TIMEOUT_MS", &timeout)?;
        }
        if let Some(attempts) = lookup("HASHEQ_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("HASHEQ_RETRY_MAX_ATTEMPTS", &attempts)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{key}={value:?}: {e}")))
}

// =============================================================================
// TESTS
// =============================================================================
