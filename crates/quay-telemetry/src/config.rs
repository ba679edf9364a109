//! Telemetry configuration from environment variables.

use serde::{Deserialize, Serialize};
use std::env;

/// Configuration for logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error) or a full directive
    pub log_level: String,

    /// Whether to emit logs to stdout
    pub console_output: bool,

    /// Whether to format logs as JSON
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "quay".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `QUAY_SERVICE_NAME`: Service name (default: quay)
    /// - `QUAY_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `QUAY_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `QUAY_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self {
            service_name: env::var("QUAY_SERVICE_NAME").unwrap_or_else(|_| "quay".to_string()),

            log_level: env::var("QUAY_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("QUAY_CONSOLE_OUTPUT")
                .map(|v| parse_flag(&v, true))
                .unwrap_or(true),

            json_logs: env::var("QUAY_JSON_LOGS")
                .map(|v| parse_flag(&v, false))
                .unwrap_or(false),
        }
    }
}

/// Interpret `true`/`1` and `false`/`0`, falling back to `default` otherwise.
pub(crate) fn parse_flag(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}
