//! Discovery node configuration

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::models::DEFAULT_SCHEMA_VERSION;
use crate::registry::RegistrySettings;

pub const DEFAULT_HTTP_PORT: u16 = 8081;
pub const DEFAULT_GRPC_PORT: u16 = 9091;
pub const DEFAULT_DISCOVERY_PORT: u16 = 8888;
pub const DEFAULT_SERVICE_NAME: &str = "lanbeacon";

/// Upper bound on the liveness timeout (one day)
pub const MAX_LIVENESS_TIMEOUT_SECS: u64 = 86_400;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Settings for the discovery node and the registry it feeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Identity string broadcast to peers
    pub service_name: String,

    /// Port of the HTTP API announced to peers
    pub http_port: u16,

    /// Port of the gRPC API announced to peers
    pub grpc_port: u16,

    /// UDP port; must match across all peers on the network
    pub discovery_port: u16,

    pub broadcast_interval_secs: u64,
    pub interface_poll_interval_secs: u64,

    /// Silence after which a record is marked unhealthy; eviction happens at twice this
    pub liveness_timeout_secs: u64,

    pub heartbeat_check_interval_secs: u64,
    pub send_timeout_millis: u64,
    pub receive_timeout_millis: u64,

    /// Bound on waiting for background tasks at shutdown
    pub shutdown_grace_secs: u64,

    /// Announce this IPv4 address instead of the auto-detected one
    pub advertise_address: Option<String>,

    pub schema_version: String,
    pub environment: String,
    pub region: String,
    pub health_check_path: String,
    pub max_datagram_bytes: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            grpc_port: DEFAULT_GRPC_PORT,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            broadcast_interval_secs: 30,
            interface_poll_interval_secs: 10,
            liveness_timeout_secs: 120,
            heartbeat_check_interval_secs: 60,
            send_timeout_millis: 5000,
            receive_timeout_millis: 1000,
            shutdown_grace_secs: 5,
            advertise_address: None,
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            environment: "development".to_string(),
            region: "local".to_string(),
            health_check_path: "/actuator/health".to_string(),
            max_datagram_bytes: 4096,
        }
    }
}

impl DiscoveryConfig {
    /// Create a new config builder
    pub fn builder() -> DiscoveryConfigBuilder {
        DiscoveryConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::invalid("service_name", "Must not be empty"));
        }

        for (field, port) in [
            ("http_port", self.http_port),
            ("grpc_port", self.grpc_port),
            ("discovery_port", self.discovery_port),
        ] {
            if port == 0 {
                return Err(ConfigError::invalid(field, "Port must be non-zero"));
            }
        }

        for (field, value) in [
            ("broadcast_interval_secs", self.broadcast_interval_secs),
            ("interface_poll_interval_secs", self.interface_poll_interval_secs),
            ("liveness_timeout_secs", self.liveness_timeout_secs),
            ("heartbeat_check_interval_secs", self.heartbeat_check_interval_secs),
            ("send_timeout_millis", self.send_timeout_millis),
            ("receive_timeout_millis", self.receive_timeout_millis),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "Must be greater than 0"));
            }
        }

        if self.liveness_timeout_secs > MAX_LIVENESS_TIMEOUT_SECS {
            return Err(ConfigError::invalid(
                "liveness_timeout_secs",
                format!("Must be at most {} seconds", MAX_LIVENESS_TIMEOUT_SECS),
            ));
        }

        if self.liveness_timeout_secs <= self.broadcast_interval_secs {
            return Err(ConfigError::invalid(
                "liveness_timeout_secs",
                "Timeout must be greater than the broadcast interval",
            ));
        }

        if let Some(addr) = &self.advertise_address {
            addr.parse::<Ipv4Addr>().map_err(|_| {
                ConfigError::invalid("advertise_address", format!("Not an IPv4 address: {}", addr))
            })?;
        }

        if self.max_datagram_bytes < 256 {
            return Err(ConfigError::invalid("max_datagram_bytes", "Must be at least 256"));
        }

        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn interface_poll_interval(&self) -> Duration {
        Duration::from_secs(self.interface_poll_interval_secs)
    }

    pub fn heartbeat_check_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_check_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_millis)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Parsed advertise address, if one is configured and valid
    pub fn advertise_ip(&self) -> Option<Ipv4Addr> {
        self.advertise_address.as_deref().and_then(|a| a.parse().ok())
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            environment: self.environment.clone(),
            region: self.region.clone(),
            health_check_path: self.health_check_path.clone(),
        }
    }
}

/// Builder for DiscoveryConfig
#[derive(Debug, Default)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    pub fn grpc_port(mut self, port: u16) -> Self {
        self.config.grpc_port = port;
        self
    }

    pub fn discovery_port(mut self, port: u16) -> Self {
        self.config.discovery_port = port;
        self
    }

    pub fn broadcast_interval_secs(mut self, secs: u64) -> Self {
        self.config.broadcast_interval_secs = secs;
        self
    }

    pub fn interface_poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.interface_poll_interval_secs = secs;
        self
    }

    pub fn liveness_timeout_secs(mut self, secs: u64) -> Self {
        self.config.liveness_timeout_secs = secs;
        self
    }

    pub fn heartbeat_check_interval_secs(mut self, secs: u64) -> Self {
        self.config.heartbeat_check_interval_secs = secs;
        self
    }

    pub fn send_timeout_millis(mut self, millis: u64) -> Self {
        self.config.send_timeout_millis = millis;
        self
    }

    pub fn receive_timeout_millis(mut self, millis: u64) -> Self {
        self.config.receive_timeout_millis = millis;
        self
    }

    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_secs = secs;
        self
    }

    pub fn advertise_address(mut self, addr: impl Into<String>) -> Self {
        self.config.advertise_address = Some(addr.into());
        self
    }

    pub fn schema_version(mut self, version: impl Into<String>) -> Self {
        self.config.schema_version = version.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = region.into();
        self
    }

    pub fn health_check_path(mut self, path: impl Into<String>) -> Self {
        self.config.health_check_path = path.into();
        self
    }

    pub fn max_datagram_bytes(mut self, max: usize) -> Self {
        self.config.max_datagram_bytes = max;
        self
    }

    /// Build and validate the config
    pub fn build(self) -> Result<DiscoveryConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
