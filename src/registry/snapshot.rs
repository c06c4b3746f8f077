//! Point-in-time views handed to external callers (e.g. mobile clients)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::record::ServiceRecord;

/// Version of the snapshot document layout
pub const DISCOVERY_VERSION: &str = "2.0";

/// Static policy telling callers how to use a discovery result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInstructions {
    pub http_endpoint: String,
    pub grpc_endpoint: String,
    pub auth_required: bool,
    pub supported_auth_methods: Vec<String>,
    pub health_check_path: String,
    /// Seconds between discovery polls
    pub discovery_refresh_interval: u32,
    /// Seconds
    pub connection_timeout: u32,
    pub retry_attempts: u32,
}

impl ConnectionInstructions {
    pub fn for_record(record: &ServiceRecord, health_check_path: &str) -> Self {
        Self {
            http_endpoint: record.http_url(),
            grpc_endpoint: record.grpc_endpoint(),
            auth_required: true,
            supported_auth_methods: vec!["JWT".to_string(), "BEARER".to_string()],
            health_check_path: health_check_path.to_string(),
            discovery_refresh_interval: 30,
            connection_timeout: 10,
            retry_attempts: 3,
        }
    }
}

/// Everything this process currently knows about the network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySnapshot {
    #[serde(rename = "self")]
    pub self_record: ServiceRecord,
    pub peers: Vec<ServiceRecord>,
    pub active_interfaces: BTreeSet<String>,
    pub generated_at: DateTime<Utc>,
    pub discovery_version: String,
    pub primary_endpoint: String,
    pub primary_grpc_endpoint: String,
    pub connection_instructions: ConnectionInstructions,
}

impl DiscoverySnapshot {
    pub fn new(
        self_record: ServiceRecord,
        peers: Vec<ServiceRecord>,
        active_interfaces: BTreeSet<String>,
        generated_at: DateTime<Utc>,
        health_check_path: &str,
    ) -> Self {
        let connection_instructions = ConnectionInstructions::for_record(&self_record, health_check_path);
        Self {
            primary_endpoint: self_record.http_url(),
            primary_grpc_endpoint: self_record.grpc_endpoint(),
            self_record,
            peers,
            active_interfaces,
            generated_at,
            discovery_version: DISCOVERY_VERSION.to_string(),
            connection_instructions,
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

/// Reconnection policy for mobile clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileConnectionConfig {
    pub timeout_seconds: u32,
    pub retry_attempts: u32,
    pub heartbeat_interval: u32,
    pub auto_reconnect: bool,
}

impl Default for MobileConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            retry_attempts: 3,
            heartbeat_interval: 30,
            auto_reconnect: true,
        }
    }
}

/// Trimmed-down discovery answer for mobile apps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileDiscovery {
    pub server_url: Option<String>,
    pub grpc_url: Option<String>,
    pub available: bool,
    pub timestamp: i64,
    pub connection_config: MobileConnectionConfig,
}

impl MobileDiscovery {
    pub fn from_snapshot(snapshot: &DiscoverySnapshot) -> Self {
        let available = snapshot.self_record.status.is_selectable();
        Self {
            server_url: available.then(|| snapshot.primary_endpoint.clone()),
            grpc_url: available.then(|| snapshot.primary_grpc_endpoint.clone()),
            available,
            timestamp: snapshot.generated_at.timestamp_millis(),
            connection_config: MobileConnectionConfig::default(),
        }
    }
}
