//! Registry facade used by the rest of the process
//!
//! Collaborators register themselves, resolve a peer before an outbound call
//! and report how that call went. The discovery tasks feed sightings in
//! through [`ServiceRegistry::observe`].

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

use super::balancer::WeightedSelector;
use super::record::{ServiceRecord, SightingOutcome};
use super::snapshot::{DiscoverySnapshot, MobileDiscovery};
use super::store::ServiceRecordStore;
use crate::clock::SharedClock;
use crate::metrics;
use crate::models::{PeerDescriptor, ServiceStatus};

// ============================================================================
// Errors
// ============================================================================

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No record with this id
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    /// Registration request is missing identity data
    #[error("Invalid registration, {field}: {reason}")]
    InvalidRegistration { field: String, reason: String },
}

// ============================================================================
// Settings
// ============================================================================

/// Values stamped onto registrations and snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySettings {
    pub environment: String,
    pub region: String,
    pub health_check_path: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            region: "local".to_string(),
            health_check_path: "/actuator/health".to_string(),
        }
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Registry statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_instances: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub maintenance: usize,
    pub other: usize,
    pub version_distribution: BTreeMap<String, usize>,
    pub average_response_time_ms: f64,
    pub last_updated: chrono::DateTime<Utc>,
}

impl RegistryStats {
    /// Share of healthy instances, in percent
    pub fn availability(&self) -> f64 {
        if self.total_instances == 0 {
            0.0
        } else {
            (self.healthy as f64 / self.total_instances as f64) * 100.0
        }
    }

    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Registry Stats\n\
             {:-<30}\n\
             Total Instances: {}\n\
             - Healthy: {}\n\
             - Unhealthy: {}\n\
             - Maintenance: {}\n\
             - Other: {}\n\
             Availability: {:.1}%\n\
             Avg Response Time: {:.1}ms",
            "",
            self.total_instances,
            self.healthy,
            self.unhealthy,
            self.maintenance,
            self.other,
            self.availability(),
            self.average_response_time_ms
        )
    }
}

// ============================================================================
// Service Registry
// ============================================================================

/// Front door to the record store
pub struct ServiceRegistry {
    identity: PeerDescriptor,
    store: Arc<ServiceRecordStore>,
    clock: SharedClock,
    settings: RegistrySettings,
    selector: WeightedSelector,
    interfaces: watch::Receiver<BTreeSet<String>>,
}

impl ServiceRegistry {
    /// Create a registry for the process described by `identity`
    pub fn new(
        identity: PeerDescriptor,
        store: Arc<ServiceRecordStore>,
        clock: SharedClock,
        settings: RegistrySettings,
    ) -> Self {
        let (_, interfaces) = watch::channel(BTreeSet::new());
        Self {
            identity,
            store,
            clock,
            settings,
            selector: WeightedSelector::new(),
            interfaces,
        }
    }

    /// Read active interface names from the interface monitor
    pub fn with_interfaces(mut self, interfaces: watch::Receiver<BTreeSet<String>>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn identity(&self) -> &PeerDescriptor {
        &self.identity
    }

    pub fn self_id(&self) -> &str {
        &self.identity.instance_id
    }

    pub fn store(&self) -> &Arc<ServiceRecordStore> {
        &self.store
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn settings(&self) -> &RegistrySettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Insert or replace a locally owned instance. It starts in `STARTING`
    /// and turns `HEALTHY` with its first heartbeat.
    pub fn register(
        &self,
        descriptor: PeerDescriptor,
        metadata: HashMap<String, String>,
    ) -> Result<ServiceRecord, RegistryError> {
        validate_descriptor(&descriptor)?;

        let now = self.clock.now();
        let mut record = ServiceRecord::local(&descriptor, now);
        record.metadata.insert("environment".to_string(), self.settings.environment.clone());
        record.metadata.insert("region".to_string(), self.settings.region.clone());
        record.metadata.insert("registered_at".to_string(), now.to_rfc3339());
        record.metadata.extend(metadata);

        if self.store.insert(record.clone()).is_some() {
            tracing::info!(instance = %record.instance_id, "Replaced registration for service instance");
        } else {
            tracing::info!(
                instance = %record.instance_id,
                address = %record.http_url(),
                "Registered service instance"
            );
        }

        Ok(record)
    }

    /// Register this process under its own identity
    pub fn register_self(&self) -> Result<ServiceRecord, RegistryError> {
        self.register(self.identity.clone(), HashMap::new())
    }

    /// Explicit removal, bypassing the staleness timeout
    pub fn unregister(&self, instance_id: &str) -> Option<ServiceRecord> {
        let removed = self.store.remove(instance_id);
        if removed.is_some() {
            tracing::info!(instance = %instance_id, "Unregistered service instance");
        }
        removed
    }

    /// Liveness signal for a registered instance
    pub fn heartbeat(&self, instance_id: &str) -> Result<(), RegistryError> {
        let now = self.clock.now();
        let recovered = self
            .store
            .update(instance_id, |record| record.heartbeat(now))
            .ok_or_else(|| RegistryError::InstanceNotFound(instance_id.to_string()))?;

        if recovered {
            tracing::info!(instance = %instance_id, "Service instance is back online");
        }
        Ok(())
    }

    /// Heartbeat for this process, re-registering if the record went missing
    pub fn refresh_self(&self) {
        if self.heartbeat(self.self_id()).is_err() {
            match self.register_self() {
                Ok(_) => {
                    let _ = self.heartbeat(self.self_id());
                }
                Err(e) => tracing::warn!("Failed to register own instance: {}", e),
            }
        }
    }

    /// Outcome of a call made to an instance.
    ///
    /// `HEALTHY` raises the weight and clears failures, `UNHEALTHY` lowers the
    /// weight and counts a failure; any other status is stored as is.
    pub fn report_health(
        &self,
        instance_id: &str,
        status: ServiceStatus,
        response_time_ms: u64,
    ) -> Result<ServiceRecord, RegistryError> {
        let now = self.clock.now();
        let record = self
            .store
            .update(instance_id, |record| {
                match status {
                    ServiceStatus::Healthy => record.record_success(response_time_ms, now),
                    ServiceStatus::Unhealthy => record.record_failure(response_time_ms, now),
                    other => {
                        record.touch(now);
                        record.response_time_ms = response_time_ms;
                        record.status = other;
                    }
                }
                record.clone()
            })
            .ok_or_else(|| RegistryError::InstanceNotFound(instance_id.to_string()))?;

        metrics::record_health_report(status.as_str());
        tracing::debug!(
            instance = %instance_id,
            status = %status,
            weight = record.weight,
            failures = record.failure_count,
            "Health report applied"
        );

        Ok(record)
    }

    /// Toggle maintenance mode
    pub fn set_maintenance(&self, instance_id: &str, enabled: bool) -> Result<ServiceRecord, RegistryError> {
        let now = self.clock.now();
        self.store
            .update(instance_id, |record| {
                if enabled {
                    record.status = ServiceStatus::Maintenance;
                } else if record.status == ServiceStatus::Maintenance {
                    record.status = ServiceStatus::Healthy;
                    record.touch(now);
                }
                record.clone()
            })
            .ok_or_else(|| RegistryError::InstanceNotFound(instance_id.to_string()))
    }

    /// Fold a peer broadcast into the store. Own broadcasts are ignored.
    pub fn observe(&self, descriptor: &PeerDescriptor) -> Option<SightingOutcome> {
        if descriptor.instance_id == self.identity.instance_id {
            return None;
        }

        let outcome = self.store.upsert_sighting(descriptor, self.clock.now());
        match outcome {
            SightingOutcome::Inserted => {
                tracing::info!(peer = %descriptor, "Discovered service instance")
            }
            SightingOutcome::Recovered => {
                tracing::info!(peer = %descriptor.instance_id, "Service instance is back online")
            }
            SightingOutcome::StatusChanged(status) => {
                tracing::info!(peer = %descriptor.instance_id, status = %status, "Service instance changed status")
            }
            SightingOutcome::Refreshed => {
                tracing::debug!(peer = %descriptor.instance_id, "Refreshed service instance")
            }
        }
        Some(outcome)
    }

    /// Forget everything learned from the network. Local registrations stay.
    pub fn clear_discovered(&self) -> usize {
        let removed = self.store.clear_discovered();
        if removed > 0 {
            tracing::info!(removed, "Cleared discovered service instances");
        }
        removed
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, instance_id: &str) -> Option<ServiceRecord> {
        self.store.get(instance_id)
    }

    /// All records, ordered by instance id
    pub fn all_instances(&self) -> Vec<ServiceRecord> {
        let mut records = self.store.records();
        records.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        records
    }

    /// Every record except this process's own
    pub fn peers(&self) -> Vec<ServiceRecord> {
        let self_id = self.self_id();
        let mut peers = self.store.filter(|r| r.instance_id != self_id);
        peers.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        peers
    }

    /// Healthy peers, fastest observed response first. This process's own
    /// record is never a candidate.
    pub fn healthy_instances(&self) -> Vec<ServiceRecord> {
        let self_id = self.self_id();
        let mut healthy = self
            .store
            .filter(|r| r.status.is_selectable() && r.instance_id != self_id);
        healthy.sort_by(|a, b| {
            a.response_time_ms
                .cmp(&b.response_time_ms)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        healthy
    }

    /// Weighted random pick among healthy peers; `None` if there are none
    pub fn select_instance(&self) -> Option<ServiceRecord> {
        self.select_instance_with(&mut rand::thread_rng())
    }

    pub fn select_instance_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ServiceRecord> {
        let healthy = self.healthy_instances();
        let picked = self.selector.select_with(&healthy, rng).cloned();
        metrics::record_selection(picked.is_some());
        picked
    }

    /// Healthy records announcing a schema version
    pub fn instances_by_version(&self, version: &str) -> Vec<ServiceRecord> {
        self.healthy_instances()
            .into_iter()
            .filter(|r| r.schema_version == version)
            .collect()
    }

    /// Healthy records carrying a metadata entry
    pub fn instances_by_metadata(&self, key: &str, value: &str) -> Vec<ServiceRecord> {
        self.healthy_instances()
            .into_iter()
            .filter(|r| r.metadata.get(key).map(String::as_str) == Some(value))
            .collect()
    }

    pub fn active_interfaces(&self) -> BTreeSet<String> {
        self.interfaces.borrow().clone()
    }

    pub fn stats(&self) -> RegistryStats {
        let records = self.store.records();

        let mut stats = RegistryStats {
            total_instances: records.len(),
            healthy: 0,
            unhealthy: 0,
            maintenance: 0,
            other: 0,
            version_distribution: BTreeMap::new(),
            average_response_time_ms: 0.0,
            last_updated: self.clock.now(),
        };

        let mut response_total = 0u64;
        for record in &records {
            match record.status {
                ServiceStatus::Healthy => {
                    stats.healthy += 1;
                    response_total += record.response_time_ms;
                }
                ServiceStatus::Unhealthy => stats.unhealthy += 1,
                ServiceStatus::Maintenance => stats.maintenance += 1,
                _ => stats.other += 1,
            }
            *stats
                .version_distribution
                .entry(record.schema_version.clone())
                .or_insert(0) += 1;
        }

        if stats.healthy > 0 {
            stats.average_response_time_ms = response_total as f64 / stats.healthy as f64;
        }

        metrics::update_registry_gauges(stats.total_instances, stats.healthy);
        stats
    }

    /// Assemble the discovery snapshot
    pub fn snapshot(&self) -> DiscoverySnapshot {
        let now = self.clock.now();
        let self_record = self
            .store
            .get(self.self_id())
            .unwrap_or_else(|| ServiceRecord::local(&self.identity, now));

        DiscoverySnapshot::new(
            self_record,
            self.peers(),
            self.active_interfaces(),
            now,
            &self.settings.health_check_path,
        )
    }

    pub fn mobile_discovery(&self) -> MobileDiscovery {
        MobileDiscovery::from_snapshot(&self.snapshot())
    }
}

fn validate_descriptor(descriptor: &PeerDescriptor) -> Result<(), RegistryError> {
    let checks = [
        ("instanceId", &descriptor.instance_id),
        ("serviceName", &descriptor.service_name),
        ("ipAddress", &descriptor.ip_address),
    ];
    for (field, value) in checks {
        if value.trim().is_empty() {
            return Err(RegistryError::InvalidRegistration {
                field: field.to_string(),
                reason: "must not be empty".to_string(),
            });
        }
    }
    if descriptor.http_port == 0 {
        return Err(RegistryError::InvalidRegistration {
            field: "httpPort".to_string(),
            reason: "must be non-zero".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
