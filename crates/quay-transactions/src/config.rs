//! Configuration for transaction coordination

use serde::{Deserialize, Serialize};
use shared_types::frames::LOCAL_TRANSACTIONS;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Transaction coordination configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Bound on waiting for a coordinator attach, declare or discharge reply
    pub request_timeout_ms: u64,
    /// Bound on waiting for consumers to finish draining before a rollback
    pub drain_timeout_ms: u64,
    /// Credit granted to a consumer when none is requested explicitly
    pub default_prefetch: u32,
    /// Declare as soon as the session opens instead of on first use
    pub eager_declare: bool,
    /// Prefix of generated coordinator link names
    pub coordinator_link_prefix: String,
    /// Capabilities requested from the coordinator target
    pub coordinator_capabilities: Vec<String>,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            drain_timeout_ms: 10_000,
            default_prefetch: 1000,
            eager_declare: true,
            coordinator_link_prefix: "quay:coordinator".to_string(),
            coordinator_capabilities: vec![LOCAL_TRANSACTIONS.to_string()],
        }
    }
}

impl TransactionConfig {
    /// Defaults overridden by environment variables.
    ///
    /// - `QUAY_TXN_REQUEST_TIMEOUT_MS`
    /// - `QUAY_TXN_DRAIN_TIMEOUT_MS`
    /// - `QUAY_TXN_PREFETCH`
    /// - `QUAY_TXN_EAGER_DECLARE`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = read_env("QUAY_TXN_REQUEST_TIMEOUT_MS", "request_timeout_ms")? {
            config.request_timeout_ms = value;
        }
        if let Some(value) = read_env("QUAY_TXN_DRAIN_TIMEOUT_MS", "drain_timeout_ms")? {
            config.drain_timeout_ms = value;
        }
        if let Some(value) = read_env("QUAY_TXN_PREFETCH", "default_prefetch")? {
            config.default_prefetch = value;
        }
        if let Some(value) = read_env("QUAY_TXN_EAGER_DECLARE", "eager_declare")? {
            config.eager_declare = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every request fail or stall a consumer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be greater than zero"));
        }
        if self.drain_timeout_ms == 0 {
            return Err(invalid("drain_timeout_ms", "must be greater than zero"));
        }
        if self.default_prefetch == 0 {
            return Err(invalid("default_prefetch", "must be greater than zero"));
        }
        if self.coordinator_link_prefix.is_empty() {
            return Err(invalid("coordinator_link_prefix", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn read_env<T>(key: &str, field: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(field, &format!("{key}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}
