// Core data structures for lanbeacon discovery

use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire status sent by a running instance
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Wire status sent once by an instance leaving the network
pub const STATUS_STOPPING: &str = "STOPPING";

/// Default descriptor schema version
pub const DEFAULT_SCHEMA_VERSION: &str = "1.0.0";

// ============================================================================
// Service Status
// ============================================================================

/// Registry-side status of a service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
    Maintenance,
    Starting,
    Stopping,
}

impl ServiceStatus {
    /// Only healthy instances take part in load balancing
    pub fn is_selectable(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Statuses the heartbeat sweep may demote to unhealthy
    pub fn can_expire(&self) -> bool {
        matches!(self, Self::Healthy | Self::Starting | Self::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Unhealthy => "UNHEALTHY",
            Self::Unknown => "UNKNOWN",
            Self::Maintenance => "MAINTENANCE",
            Self::Starting => "STARTING",
            Self::Stopping => "STOPPING",
        }
    }

    /// Map a status string received from a peer
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" | "HEALTHY" | "UP" => Self::Healthy,
            "UNHEALTHY" | "DOWN" => Self::Unhealthy,
            "MAINTENANCE" => Self::Maintenance,
            "STARTING" => Self::Starting,
            "STOPPING" => Self::Stopping,
            _ => Self::Unknown,
        }
    }

    /// Parse a status name as used by the HTTP API
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HEALTHY" => Some(Self::Healthy),
            "UNHEALTHY" => Some(Self::Unhealthy),
            "UNKNOWN" => Some(Self::Unknown),
            "MAINTENANCE" => Some(Self::Maintenance),
            "STARTING" => Some(Self::Starting),
            "STOPPING" => Some(Self::Stopping),
            _ => None,
        }
    }

    pub fn all() -> [Self; 6] {
        [
            Self::Healthy,
            Self::Unhealthy,
            Self::Unknown,
            Self::Maintenance,
            Self::Starting,
            Self::Stopping,
        ]
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Peer Descriptor
// ============================================================================

/// Minimal identity and reachability record broadcast by every instance.
///
/// Built fresh on every broadcast tick and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerDescriptor {
    pub instance_id: String,
    pub service_name: String,
    pub ip_address: String,
    pub http_port: u16,
    pub grpc_port: u16,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub schema_version: String,
    pub status: String,
}

impl PeerDescriptor {
    /// Create an active descriptor, deriving the instance id from name, address and port
    pub fn new(
        service_name: impl Into<String>,
        ip_address: impl Into<String>,
        http_port: u16,
        grpc_port: u16,
        timestamp: i64,
    ) -> Self {
        let service_name = service_name.into();
        let ip_address = ip_address.into();
        Self {
            instance_id: instance_id_for(&service_name, &ip_address, http_port),
            service_name,
            ip_address,
            http_port,
            grpc_port,
            timestamp,
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            status: STATUS_ACTIVE.to_string(),
        }
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Status announced by the peer, mapped to the registry's vocabulary
    pub fn announced_status(&self) -> ServiceStatus {
        ServiceStatus::from_wire(&self.status)
    }

    pub fn http_url(&self) -> String {
        http_url(&self.ip_address, self.http_port)
    }

    pub fn grpc_endpoint(&self) -> String {
        grpc_endpoint(&self.ip_address, self.grpc_port)
    }
}

impl fmt::Display for PeerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}, grpc {}, {})",
            self.instance_id, self.ip_address, self.http_port, self.grpc_port, self.status
        )
    }
}

/// Instance id: `{service_name}-{ip_address}-{http_port}`.
///
/// Two processes with the same name, address and port are the same logical
/// instance, so a restarted process replaces its previous record.
pub fn instance_id_for(service_name: &str, ip_address: &str, http_port: u16) -> String {
    format!("{service_name}-{ip_address}-{http_port}")
}

pub fn http_url(ip_address: &str, port: u16) -> String {
    format!("http://{ip_address}:{port}")
}

pub fn grpc_endpoint(ip_address: &str, port: u16) -> String {
    format!("{ip_address}:{port}")
}
