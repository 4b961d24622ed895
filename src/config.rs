//! Process configuration.
//!
//! Values come from (lowest to highest precedence) built-in defaults, an
//! optional `.env` file, `HAYSTACK_*` environment variables, and finally CLI
//! flags applied by the binary.

use crate::retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_KEYSPACE: &str = "haystack_directory";
pub const DEFAULT_MAX_PHOTO_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where the backing table lives and how its keyspace is provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Table server base URLs. Empty means an in-process table.
    pub endpoints: Vec<String>,
    pub keyspace: String,
    pub replication_factor: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            keyspace: DEFAULT_KEYSPACE.to_string(),
            replication_factor: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Reservation attempts before CAS contention is reported as transient.
    pub cas_attempts: usize,
    /// Fraction of capacity at which a volume stops accepting new photos.
    pub high_water_ratio: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            cas_attempts: 8,
            high_water_ratio: 0.95,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    pub store: StoreConfig,
    pub retry: RetryPolicy,
    pub allocator: AllocatorConfig,
    pub max_photo_bytes: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            retry: RetryPolicy::default(),
            allocator: AllocatorConfig::default(),
            max_photo_bytes: DEFAULT_MAX_PHOTO_BYTES,
        }
    }
}

impl DirectoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine.
        let _ = dotenvy::dotenv();

        let mut config = Self::new();

        if let Ok(raw) = env::var("HAYSTACK_STORE_ENDPOINTS") {
            config.store.endpoints = split_endpoints(&raw);
        }
        if let Ok(keyspace) = env::var("HAYSTACK_KEYSPACE") {
            config.store.keyspace = keyspace;
        }
        if let Some(rf) = parse_var("HAYSTACK_REPLICATION_FACTOR")? {
            config.store.replication_factor = rf;
        }
        if let Some(ms) = parse_var("HAYSTACK_CALL_TIMEOUT_MS")? {
            config.retry.call_timeout_ms = ms;
        }
        if let Some(attempts) = parse_var("HAYSTACK_RETRY_ATTEMPTS")? {
            config.retry.attempts = attempts;
        }
        if let Some(ms) = parse_var("HAYSTACK_RETRY_BASE_DELAY_MS")? {
            config.retry.base_delay_ms = ms;
        }
        if let Some(ms) = parse_var("HAYSTACK_RETRY_MAX_DELAY_MS")? {
            config.retry.max_delay_ms = ms;
        }
        if let Some(attempts) = parse_var("HAYSTACK_CAS_ATTEMPTS")? {
            config.allocator.cas_attempts = attempts;
        }
        if let Some(ratio) = parse_var("HAYSTACK_HIGH_WATER_RATIO")? {
            config.allocator.high_water_ratio = ratio;
        }
        if let Some(bytes) = parse_var("HAYSTACK_MAX_PHOTO_BYTES")? {
            config.max_photo_bytes = bytes;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.replication_factor == 0 {
            return Err(ConfigError::Invalid(
                "replication_factor must be at least 1".to_string(),
            ));
        }
        if !is_identifier(&self.store.keyspace) {
            return Err(ConfigError::Invalid(format!(
                "keyspace '{}' must be non-empty and contain only [A-Za-z0-9_]",
                self.store.keyspace
            )));
        }
        if self.retry.attempts == 0 || self.allocator.cas_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry and CAS attempt counts must be at least 1".to_string(),
            ));
        }
        if self.retry.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "call_timeout_ms must be positive".to_string(),
            ));
        }
        let ratio = self.allocator.high_water_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "high_water_ratio {} must be in (0, 1]",
                ratio
            )));
        }
        if self.max_photo_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_photo_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn split_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_var<T>(var: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
