//! Registry-side state for a single service instance

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{self, PeerDescriptor, ServiceStatus, STATUS_ACTIVE};

/// Lowest selection weight; keeps a struggling instance eligible
pub const MIN_WEIGHT: f64 = 0.1;

/// Highest selection weight
pub const MAX_WEIGHT: f64 = 2.0;

/// Weight of a freshly created record
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Multiplier applied on a successful interaction
pub const SUCCESS_FACTOR: f64 = 1.1;

/// Multiplier applied on a failed interaction
pub const FAILURE_FACTOR: f64 = 0.8;

/// Clamp a weight into `[MIN_WEIGHT, MAX_WEIGHT]`
pub fn clamp_weight(weight: f64) -> f64 {
    if weight.is_nan() {
        return MIN_WEIGHT;
    }
    weight.clamp(MIN_WEIGHT, MAX_WEIGHT)
}

/// Where a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordOrigin {
    /// Registered through the facade by a collaborator in this process
    Local,
    /// Learned from a peer broadcast
    Discovered,
}

/// What a sighting did to an existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SightingOutcome {
    /// First time this instance was seen
    Inserted,
    /// Known instance, status unchanged
    Refreshed,
    /// Instance came back from `UNHEALTHY`
    Recovered,
    /// Instance announced a different status
    StatusChanged(ServiceStatus),
}

/// Everything the registry knows about one instance.
///
/// Only [`ServiceRecordStore`](super::store::ServiceRecordStore) owns these;
/// callers always get clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub instance_id: String,
    pub service_name: String,
    pub ip_address: String,
    pub http_port: u16,
    pub grpc_port: u16,
    /// Sender timestamp of the latest descriptor (ms since epoch)
    pub timestamp: i64,
    pub schema_version: String,
    pub status: ServiceStatus,
    pub origin: RecordOrigin,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub response_time_ms: u64,
    pub failure_count: u32,
    pub weight: f64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceRecord {
    fn from_descriptor(
        descriptor: &PeerDescriptor,
        status: ServiceStatus,
        origin: RecordOrigin,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            instance_id: descriptor.instance_id.clone(),
            service_name: descriptor.service_name.clone(),
            ip_address: descriptor.ip_address.clone(),
            http_port: descriptor.http_port,
            grpc_port: descriptor.grpc_port,
            timestamp: descriptor.timestamp,
            schema_version: descriptor.schema_version.clone(),
            status,
            origin,
            last_heartbeat: now,
            registered_at: now,
            response_time_ms: 0,
            failure_count: 0,
            weight: DEFAULT_WEIGHT,
            metadata: HashMap::new(),
        }
    }

    /// Record for a peer first seen on the network
    pub fn discovered(descriptor: &PeerDescriptor, now: DateTime<Utc>) -> Self {
        Self::from_descriptor(
            descriptor,
            descriptor.announced_status(),
            RecordOrigin::Discovered,
            now,
        )
    }

    /// Record for an instance registered in this process; healthy after its first heartbeat
    pub fn local(descriptor: &PeerDescriptor, now: DateTime<Utc>) -> Self {
        Self::from_descriptor(descriptor, ServiceStatus::Starting, RecordOrigin::Local, now)
    }

    /// Move `last_heartbeat` forward, never backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_heartbeat {
            self.last_heartbeat = now;
        }
    }

    /// Time elapsed since the last heartbeat
    pub fn since_heartbeat(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_heartbeat
    }

    /// Fold a fresh broadcast from the same instance into this record.
    ///
    /// Weight and failure count belong to the health-report path and are left
    /// alone, except that a recovery from `UNHEALTHY` clears the failure count.
    pub fn apply_sighting(&mut self, descriptor: &PeerDescriptor, now: DateTime<Utc>) -> SightingOutcome {
        self.service_name.clone_from(&descriptor.service_name);
        self.ip_address.clone_from(&descriptor.ip_address);
        self.http_port = descriptor.http_port;
        self.grpc_port = descriptor.grpc_port;
        self.timestamp = self.timestamp.max(descriptor.timestamp);
        self.schema_version.clone_from(&descriptor.schema_version);
        self.touch(now);

        let announced = descriptor.announced_status();
        let previous = self.status;

        // An operator-set maintenance flag outlives ordinary "still here" broadcasts
        if previous == ServiceStatus::Maintenance && announced == ServiceStatus::Healthy {
            return SightingOutcome::Refreshed;
        }

        self.status = announced;
        if previous == announced {
            SightingOutcome::Refreshed
        } else if previous == ServiceStatus::Unhealthy && announced == ServiceStatus::Healthy {
            self.failure_count = 0;
            SightingOutcome::Recovered
        } else {
            SightingOutcome::StatusChanged(announced)
        }
    }

    /// Plain liveness signal. Returns true when the record came back to `HEALTHY`.
    ///
    /// `MAINTENANCE` and `STOPPING` are left alone; only a new registration or
    /// sighting moves a record out of them.
    pub fn heartbeat(&mut self, now: DateTime<Utc>) -> bool {
        self.touch(now);
        if matches!(
            self.status,
            ServiceStatus::Healthy | ServiceStatus::Maintenance | ServiceStatus::Stopping
        ) {
            return false;
        }
        self.status = ServiceStatus::Healthy;
        self.failure_count = 0;
        true
    }

    /// A caller reached this instance successfully
    pub fn record_success(&mut self, response_time_ms: u64, now: DateTime<Utc>) {
        self.touch(now);
        self.response_time_ms = response_time_ms;
        self.status = ServiceStatus::Healthy;
        self.failure_count = 0;
        self.weight = clamp_weight((self.weight * SUCCESS_FACTOR).min(MAX_WEIGHT));
    }

    /// A caller failed to reach this instance
    pub fn record_failure(&mut self, response_time_ms: u64, now: DateTime<Utc>) {
        self.touch(now);
        self.response_time_ms = response_time_ms;
        self.status = ServiceStatus::Unhealthy;
        self.failure_count = self.failure_count.saturating_add(1);
        self.weight = clamp_weight((self.weight * FAILURE_FACTOR).max(MIN_WEIGHT));
    }

    /// Rebuild the broadcast form of this record
    pub fn descriptor(&self) -> PeerDescriptor {
        let status = match self.status {
            ServiceStatus::Healthy => STATUS_ACTIVE,
            other => other.as_str(),
        };
        PeerDescriptor {
            instance_id: self.instance_id.clone(),
            service_name: self.service_name.clone(),
            ip_address: self.ip_address.clone(),
            http_port: self.http_port,
            grpc_port: self.grpc_port,
            timestamp: self.timestamp,
            schema_version: self.schema_version.clone(),
            status: status.to_string(),
        }
    }

    pub fn http_url(&self) -> String {
        models::http_url(&self.ip_address, self.http_port)
    }

    pub fn grpc_endpoint(&self) -> String {
        models::grpc_endpoint(&self.ip_address, self.grpc_port)
    }

    pub fn is_local(&self) -> bool {
        self.origin == RecordOrigin::Local
    }
}
