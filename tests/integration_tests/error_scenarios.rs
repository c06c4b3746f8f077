//! Error scenario integration tests
//!
//! Tests failure modes and how the node copes with them:
//! 1. Malformed datagrams
//! 2. Ports already in use
//! 3. Invalid configuration
//! 4. Unknown instances and bad registrations

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lanbeacon::clock::SystemClock;
use lanbeacon::config::DiscoveryConfig;
use lanbeacon::discovery::{DiscoveryNode, Listener, NodeError};
use lanbeacon::error::{Error, ErrorCategory};
use lanbeacon::registry::{RegistryError, RegistrySettings, ServiceRecordStore, ServiceRegistry};
use lanbeacon::PeerDescriptor;
use tokio_test::{assert_err, assert_ok};

use super::fixtures::{
    eventually, loopback_config, loopback_interfaces, loopback_socket, MALFORMED_DATAGRAMS,
    SAMPLE_DATAGRAM, SAMPLE_PEER_ID,
};

fn registry() -> Arc<ServiceRegistry> {
    Arc::new(ServiceRegistry::new(
        PeerDescriptor::new("AMS-AUTH-SERVICE", "127.0.0.1", 18501, 19501, 0),
        Arc::new(ServiceRecordStore::new()),
        Arc::new(SystemClock),
        RegistrySettings::default(),
    ))
}

// ============================================================================
// Datagram Errors
// ============================================================================

#[tokio::test]
async fn test_malformed_datagrams_are_dropped() {
    let sink = loopback_socket().await;
    let node = DiscoveryNode::builder(loopback_config("AMS-GATEWAY", 18601))
        .interface_source(loopback_interfaces())
        .listener_socket(loopback_socket().await)
        .broadcast_port(sink.local_addr().unwrap().port())
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let target = node.listener_addr().unwrap();
    let peer = loopback_socket().await;
    for payload in MALFORMED_DATAGRAMS {
        peer.send_to(payload.as_bytes(), target).await.unwrap();
    }

    // The listener survives and still accepts a valid descriptor afterwards
    peer.send_to(SAMPLE_DATAGRAM.as_bytes(), target).await.unwrap();
    let registry = node.registry().clone();
    assert!(eventually(Duration::from_secs(5), || registry.get(SAMPLE_PEER_ID).is_some()).await);
    assert_eq!(registry.peers().len(), 1);

    node.shutdown().await;
}

// ============================================================================
// Bind Errors
// ============================================================================

#[tokio::test]
async fn test_listener_bind_conflict() {
    let holder = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let result = Listener::bind(port, registry(), Duration::from_millis(50), 4096).await;
    match result {
        Err(NodeError::Bind { role, addr, .. }) => {
            assert_eq!(role, "listener");
            assert_eq!(addr.port(), port);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("bind should fail while the port is held"),
    }
}

#[tokio::test]
async fn test_node_runs_without_listener() {
    let holder = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    let port = holder.local_addr().unwrap().port();
    let sink = loopback_socket().await;

    let config = DiscoveryConfig {
        discovery_port: port,
        ..loopback_config("AMS-GATEWAY", 18701)
    };
    let node = DiscoveryNode::builder(config)
        .interface_source(loopback_interfaces())
        .broadcast_port(sink.local_addr().unwrap().port())
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    assert!(node.listener_addr().is_none());
    assert!(node.is_broadcasting());
    assert!(!node.running_tasks().contains(&"listener".to_string()));

    let report = node.shutdown().await;
    assert!(report.is_clean());
}

// ============================================================================
// Config Errors
// ============================================================================

#[test]
fn test_invalid_config_rejected_before_start() {
    let config = DiscoveryConfig {
        discovery_port: 0,
        ..DiscoveryConfig::default()
    };

    let Err(err) = DiscoveryNode::builder(config).build() else {
        panic!("build should reject a zero discovery port");
    };
    assert!(matches!(err, NodeError::Config(_)));
    assert!(!err.is_recoverable());
}

#[test]
fn test_oversized_liveness_timeout_rejected() {
    let config = DiscoveryConfig {
        liveness_timeout_secs: 10_000_000_000_000_000,
        ..DiscoveryConfig::default()
    };

    let Err(err) = DiscoveryNode::builder(config).build() else {
        panic!("build should reject an oversized liveness timeout");
    };
    assert!(matches!(err, NodeError::Config(_)));
}

#[test]
fn test_advertise_address_must_be_ipv4() {
    let config = DiscoveryConfig {
        advertise_address: Some("fe80::1".to_string()),
        ..DiscoveryConfig::default()
    };
    assert_err!(config.validate());
}

// ============================================================================
// Registry Errors
// ============================================================================

#[test]
fn test_unknown_instance() {
    let registry = registry();

    let err = assert_err!(registry.heartbeat("AMS-AUTH-SERVICE-10.0.0.1-8081"));
    assert!(matches!(err, RegistryError::InstanceNotFound(_)));

    let err: Error = assert_err!(registry.set_maintenance("missing", true)).into();
    assert_eq!(err.category(), ErrorCategory::Registry);
    assert!(err.is_recoverable());
}

#[test]
fn test_invalid_registration() {
    let registry = registry();

    let mut descriptor = PeerDescriptor::new("AMS-AUTH-SERVICE", "10.0.0.1", 8081, 9091, 0);
    descriptor.ip_address = String::new();
    let err = assert_err!(registry.register(descriptor, HashMap::new()));
    assert!(matches!(err, RegistryError::InvalidRegistration { .. }));

    let valid = PeerDescriptor::new("AMS-AUTH-SERVICE", "10.0.0.1", 8081, 9091, 0);
    let record = assert_ok!(registry.register(valid, HashMap::new()));
    assert_eq!(record.metadata.get("environment").map(String::as_str), Some("development"));
}
