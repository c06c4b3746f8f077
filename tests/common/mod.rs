//! Common test utilities

use std::collections::HashMap;
use std::sync::Arc;

use lanbeacon::clock::{ManualClock, SharedClock};
use lanbeacon::registry::{RegistrySettings, ServiceRecordStore, ServiceRegistry};
use lanbeacon::PeerDescriptor;

/// Identity used for the registry under test
pub fn self_descriptor() -> PeerDescriptor {
    PeerDescriptor::new("AMS-AUTH-SERVICE", "192.168.1.10", 8081, 9091, 0)
}

/// Peer descriptor on the same service with a distinct address
pub fn peer(ip: &str) -> PeerDescriptor {
    PeerDescriptor::new("AMS-AUTH-SERVICE", ip, 8081, 9091, 0)
}

/// Registry driven by a manual clock
pub fn create_test_registry() -> (Arc<ServiceRegistry>, ManualClock) {
    let clock = ManualClock::starting_now();
    let shared: SharedClock = Arc::new(clock.clone());
    let registry = Arc::new(ServiceRegistry::new(
        self_descriptor(),
        Arc::new(ServiceRecordStore::new()),
        shared,
        RegistrySettings::default(),
    ));
    (registry, clock)
}

/// Register `ip` locally and mark it healthy
#[allow(dead_code)]
pub fn register_healthy(registry: &ServiceRegistry, ip: &str) -> String {
    let record = registry
        .register(peer(ip), HashMap::new())
        .expect("registration should succeed");
    registry
        .heartbeat(&record.instance_id)
        .expect("heartbeat should succeed");
    record.instance_id
}
