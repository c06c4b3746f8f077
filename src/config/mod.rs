//! Configuration management for lanbeacon
//!
//! This module handles loading and validating configuration from environment variables,
//! TOML files, and command-line arguments.

pub mod discovery;

pub use discovery::{ConfigError, DiscoveryConfig, DiscoveryConfigBuilder};

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discovery and registry configuration
    pub discovery: DiscoveryConfig,

    /// HTTP query API configuration
    pub api: ApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// HTTP API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Bind host
    pub host: String,

    /// Bind port; the announced HTTP port when unset
    pub port: Option<u16>,

    /// Enable permissive CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: None,
            enable_cors: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset or unparseable
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = DiscoveryConfig::default();

        let discovery = DiscoveryConfig {
            service_name: env_string("DISCOVERY_SERVICE_NAME", defaults.service_name.clone()),
            http_port: env_parse("SERVER_PORT", defaults.http_port),
            grpc_port: env_parse("GRPC_SERVER_PORT", defaults.grpc_port),
            discovery_port: env_parse("DISCOVERY_BROADCAST_PORT", defaults.discovery_port),
            broadcast_interval_secs: env_parse(
                "DISCOVERY_BROADCAST_INTERVAL",
                defaults.broadcast_interval_secs,
            ),
            interface_poll_interval_secs: env_parse(
                "DISCOVERY_INTERFACE_POLL_INTERVAL",
                defaults.interface_poll_interval_secs,
            ),
            liveness_timeout_secs: env_parse(
                "DISCOVERY_LIVENESS_TIMEOUT",
                defaults.liveness_timeout_secs,
            ),
            advertise_address: std::env::var("DISCOVERY_ADVERTISE_ADDRESS")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            environment: env_string("DISCOVERY_ENVIRONMENT", defaults.environment.clone()),
            region: env_string("DISCOVERY_REGION", defaults.region.clone()),
            ..defaults
        };

        let api_defaults = ApiConfig::default();
        let api = ApiConfig {
            host: env_string("LANBEACON_API_HOST", api_defaults.host),
            port: std::env::var("LANBEACON_API_PORT")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            enable_cors: api_defaults.enable_cors,
        };

        let logging_defaults = LoggingConfig::default();
        let logging = LoggingConfig {
            level: env_string("LANBEACON_LOG_LEVEL", logging_defaults.level),
            format: env_string("LANBEACON_LOG_FORMAT", logging_defaults.format),
        };

        Self {
            discovery,
            api,
            logging,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discovery.validate()?;

        if self.api.port == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "api.port".to_string(),
                reason: "Port must be non-zero".to_string(),
            });
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "logging.format".to_string(),
                reason: format!("Unknown format '{}', expected text or json", self.logging.format),
            });
        }

        self.api_addr()?;
        Ok(())
    }

    /// Socket address the HTTP API binds to
    pub fn api_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = self.api.port.unwrap_or(self.discovery.http_port);
        format!("{}:{}", self.api.host, port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                field: "api.host".to_string(),
                reason: format!("Invalid address: {}:{}", self.api.host, port),
            })
    }
}
