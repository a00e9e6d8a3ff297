//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and tracing.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for spans and logs
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Deployment name (LOCAL, LAB, PROD)
    pub deployment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "micro-fabric".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            deployment: "LOCAL".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FABRIC_SERVICE_NAME` or `OTEL_SERVICE_NAME`: Service name (default: micro-fabric)
    /// - `FABRIC_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `FABRIC_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `FABRIC_JSON_LOGS`: Enable JSON logs (default: false locally, true in containers)
    /// - `FABRIC_DEPLOYMENT`: Deployment name (default: LOCAL)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("FABRIC_SERVICE_NAME")
                .or_else(|_| env::var("OTEL_SERVICE_NAME"))
                .unwrap_or_else(|_| "micro-fabric".to_string()),

            log_level: env::var("FABRIC_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("FABRIC_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("FABRIC_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            deployment: env::var("FABRIC_DEPLOYMENT")
                .map(|v| v.to_uppercase())
                .unwrap_or_else(|_| "LOCAL".to_string()),
        }
    }

    /// Create configuration for a specific service host.
    pub fn for_service(host: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = host.to_string();
        config
    }
}
