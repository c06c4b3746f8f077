//! Registry integration tests
//!
//! Covers the life of a record from first sighting to eviction, and the
//! weight adjustments that drive instance selection.

use std::collections::HashMap;
use std::sync::Arc;

use lanbeacon::clock::ManualClock;
use lanbeacon::registry::record::{clamp_weight, MAX_WEIGHT, MIN_WEIGHT};
use lanbeacon::registry::{
    HeartbeatMonitor, RegistrySettings, ServiceRecordStore, ServiceRegistry, SightingOutcome,
};
use lanbeacon::{PeerDescriptor, ServiceStatus};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

const LIVENESS_SECS: u64 = 120;

struct Harness {
    registry: ServiceRegistry,
    monitor: HeartbeatMonitor,
    clock: ManualClock,
}

fn harness() -> Harness {
    let clock = ManualClock::starting_now();
    let store = Arc::new(ServiceRecordStore::new());
    let registry = ServiceRegistry::new(
        PeerDescriptor::new("AMS-AUTH-SERVICE", "192.168.1.10", 8081, 9091, 0),
        store.clone(),
        Arc::new(clock.clone()),
        RegistrySettings::default(),
    );
    let monitor = HeartbeatMonitor::new(store, Arc::new(clock.clone()), LIVENESS_SECS);
    Harness {
        registry,
        monitor,
        clock,
    }
}

fn peer(ip: &str) -> PeerDescriptor {
    PeerDescriptor::new("AMS-AUTH-SERVICE", ip, 8081, 9091, 0)
}

fn healthy_local(registry: &ServiceRegistry, ip: &str) -> String {
    let record = registry.register(peer(ip), HashMap::new()).unwrap();
    registry.heartbeat(&record.instance_id).unwrap();
    record.instance_id
}

// ============================================================================
// Liveness Lifecycle
// ============================================================================

#[test]
fn test_sighting_sweep_and_eviction() {
    let h = harness();
    let descriptor = peer("10.0.0.2");
    let id = descriptor.instance_id.clone();

    assert_eq!(h.registry.observe(&descriptor), Some(SightingOutcome::Inserted));
    assert_eq!(h.registry.get(&id).unwrap().status, ServiceStatus::Healthy);

    // Still inside the liveness window
    h.clock.advance_secs(119);
    assert!(h.monitor.sweep().is_quiet());
    assert_eq!(h.registry.get(&id).unwrap().status, ServiceStatus::Healthy);

    h.clock.advance_secs(2);
    let report = h.monitor.sweep();
    assert_eq!(report.marked_unhealthy, vec![id.clone()]);
    assert_eq!(h.registry.get(&id).unwrap().status, ServiceStatus::Unhealthy);
    assert!(h.registry.select_instance().is_none());

    // Marked once, not on every sweep
    assert!(h.monitor.sweep().marked_unhealthy.is_empty());

    h.clock.advance_secs(LIVENESS_SECS as i64);
    let report = h.monitor.sweep();
    assert_eq!(report.evicted, vec![id.clone()]);
    assert!(h.registry.get(&id).is_none());
}

#[test]
fn test_fresh_sighting_recovers_unhealthy_peer() {
    let h = harness();
    let descriptor = peer("10.0.0.3");
    h.registry.observe(&descriptor);

    h.clock.advance_secs(130);
    h.monitor.sweep();
    assert_eq!(
        h.registry.get(&descriptor.instance_id).unwrap().status,
        ServiceStatus::Unhealthy
    );

    assert_eq!(h.registry.observe(&descriptor), Some(SightingOutcome::Recovered));
    let record = h.registry.get(&descriptor.instance_id).unwrap();
    assert_eq!(record.status, ServiceStatus::Healthy);
    assert_eq!(record.failure_count, 0);
    assert_eq!(h.registry.select_instance().unwrap().instance_id, descriptor.instance_id);
}

#[test]
fn test_stopping_peer_is_not_selected() {
    let h = harness();
    let descriptor = peer("10.0.0.4");
    h.registry.observe(&descriptor);

    let outcome = h.registry.observe(&descriptor.clone().with_status("STOPPING"));
    assert_eq!(outcome, Some(SightingOutcome::StatusChanged(ServiceStatus::Stopping)));
    assert!(h.registry.healthy_instances().is_empty());
    assert!(h.registry.select_instance().is_none());
}

#[test]
fn test_own_descriptor_is_ignored() {
    let h = harness();
    let own = h.registry.identity().clone();

    assert_eq!(h.registry.observe(&own), None);
    assert!(h.registry.get(&own.instance_id).is_none());
    assert!(h.registry.peers().is_empty());
}

#[test]
fn test_maintenance_survives_broadcasts() {
    let h = harness();
    let descriptor = peer("10.0.0.5");
    h.registry.observe(&descriptor);

    h.registry.set_maintenance(&descriptor.instance_id, true).unwrap();
    h.registry.observe(&descriptor);
    assert_eq!(
        h.registry.get(&descriptor.instance_id).unwrap().status,
        ServiceStatus::Maintenance
    );

    // Maintenance records do not expire, but stale ones are still evicted
    h.clock.advance_secs(130);
    assert!(h.monitor.sweep().marked_unhealthy.is_empty());
    h.clock.advance_secs(120);
    assert_eq!(h.monitor.sweep().evicted, vec![descriptor.instance_id]);
}

#[test]
fn test_clear_discovered_keeps_local() {
    let h = harness();
    let local = healthy_local(&h.registry, "10.0.1.1");
    h.registry.observe(&peer("10.0.0.6"));
    h.registry.observe(&peer("10.0.0.7"));

    assert_eq!(h.registry.clear_discovered(), 2);
    let remaining: Vec<String> = h
        .registry
        .all_instances()
        .into_iter()
        .map(|r| r.instance_id)
        .collect();
    assert_eq!(remaining, vec![local]);
}

// ============================================================================
// Weights and Selection
// ============================================================================

#[test]
fn test_success_sequence_weight() {
    let h = harness();
    let id = healthy_local(&h.registry, "10.0.2.1");

    let mut weight = 0.0;
    for _ in 0..5 {
        weight = h
            .registry
            .report_health(&id, ServiceStatus::Healthy, 12)
            .unwrap()
            .weight;
    }
    assert!((weight - 1.61051).abs() < 1e-9, "weight was {weight}");

    for _ in 0..10 {
        weight = h
            .registry
            .report_health(&id, ServiceStatus::Healthy, 12)
            .unwrap()
            .weight;
    }
    assert_eq!(weight, MAX_WEIGHT);
}

#[test]
fn test_failure_sequence_floors_weight() {
    let h = harness();
    let id = healthy_local(&h.registry, "10.0.2.2");

    let mut record = None;
    for _ in 0..20 {
        record = Some(
            h.registry
                .report_health(&id, ServiceStatus::Unhealthy, 5000)
                .unwrap(),
        );
    }
    let record = record.unwrap();
    assert_eq!(record.weight, MIN_WEIGHT);
    assert_eq!(record.failure_count, 20);
    assert_eq!(record.status, ServiceStatus::Unhealthy);

    let record = h.registry.report_health(&id, ServiceStatus::Healthy, 20).unwrap();
    assert_eq!(record.failure_count, 0);
    assert!((record.weight - MIN_WEIGHT * 1.1).abs() < 1e-9);
}

#[test]
fn test_selection_follows_weights() {
    let h = harness();
    let heavy = healthy_local(&h.registry, "10.0.3.1");
    let light = healthy_local(&h.registry, "10.0.3.2");

    for _ in 0..10 {
        h.registry.report_health(&heavy, ServiceStatus::Healthy, 10).unwrap();
    }
    for _ in 0..15 {
        h.registry.report_health(&light, ServiceStatus::Unhealthy, 10).unwrap();
    }
    h.registry.report_health(&light, ServiceStatus::Healthy, 10).unwrap();

    // heavy = 2.0, light = 0.11
    let mut rng = StdRng::seed_from_u64(7);
    let draws = 10_000;
    let mut heavy_hits = 0;
    for _ in 0..draws {
        let picked = h.registry.select_instance_with(&mut rng).unwrap();
        if picked.instance_id == heavy {
            heavy_hits += 1;
        }
    }

    let share = heavy_hits as f64 / draws as f64;
    assert!((0.92..0.97).contains(&share), "heavy share was {share}");
}

#[test]
fn test_every_healthy_instance_is_reachable() {
    let h = harness();
    let ids: Vec<String> = (1..=4)
        .map(|n| healthy_local(&h.registry, &format!("10.0.4.{n}")))
        .collect();

    let mut rng = StdRng::seed_from_u64(42);
    let mut seen = std::collections::HashSet::new();
    for _ in 0..1000 {
        seen.insert(h.registry.select_instance_with(&mut rng).unwrap().instance_id);
    }
    for id in &ids {
        assert!(seen.contains(id), "{id} was never selected");
    }
}

#[test]
fn test_select_with_no_healthy_instances() {
    let h = harness();
    assert!(h.registry.select_instance().is_none());

    let id = healthy_local(&h.registry, "10.0.5.1");
    h.registry.set_maintenance(&id, true).unwrap();
    assert!(h.registry.select_instance().is_none());
}

#[test]
fn test_stats_reflect_statuses() {
    let h = harness();
    let a = healthy_local(&h.registry, "10.0.6.1");
    let b = healthy_local(&h.registry, "10.0.6.2");
    healthy_local(&h.registry, "10.0.6.3");

    h.registry.report_health(&a, ServiceStatus::Healthy, 100).unwrap();
    h.registry.report_health(&b, ServiceStatus::Unhealthy, 900).unwrap();

    let stats = h.registry.stats();
    assert_eq!(stats.total_instances, 3);
    assert_eq!(stats.healthy, 2);
    assert_eq!(stats.unhealthy, 1);
    assert!((stats.average_response_time_ms - 50.0).abs() < f64::EPSILON);
    assert!((stats.availability() - 2.0 / 3.0 * 100.0).abs() < 1e-9);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_clamp_weight_in_bounds(weight in proptest::num::f64::ANY) {
        let clamped = clamp_weight(weight);
        prop_assert!((MIN_WEIGHT..=MAX_WEIGHT).contains(&clamped));
    }

    #[test]
    fn prop_reports_keep_weight_in_bounds(reports in proptest::collection::vec(any::<bool>(), 0..60)) {
        let h = harness();
        let id = healthy_local(&h.registry, "10.0.9.1");

        for success in reports {
            let status = if success { ServiceStatus::Healthy } else { ServiceStatus::Unhealthy };
            let record = h.registry.report_health(&id, status, 1).unwrap();
            prop_assert!(record.weight >= MIN_WEIGHT && record.weight <= MAX_WEIGHT);
        }
    }
}
