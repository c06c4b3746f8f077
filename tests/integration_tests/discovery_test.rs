//! Discovery over loopback UDP
//!
//! Nodes get pre-bound loopback listener sockets and an interface source
//! that reports 127.0.0.1 as the broadcast address, so no real broadcast
//! traffic leaves the host.

use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanbeacon::clock::ManualClock;
use lanbeacon::discovery::{DiscoveryNode, InterfaceInfo, InterfaceSource};
use lanbeacon::models::instance_id_for;
use lanbeacon::ServiceStatus;

use super::fixtures::{
    eventually, loopback_config, loopback_interfaces, loopback_socket, SAMPLE_DATAGRAM,
    SAMPLE_PEER_ID, SAMPLE_STOPPING_DATAGRAM,
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_two_nodes_discover_each_other() {
    let socket_a = loopback_socket().await;
    let socket_b = loopback_socket().await;
    let port_a = socket_a.local_addr().unwrap().port();
    let port_b = socket_b.local_addr().unwrap().port();

    let node_a = DiscoveryNode::builder(loopback_config("AMS-AUTH-SERVICE", 18101))
        .interface_source(loopback_interfaces())
        .listener_socket(socket_a)
        .broadcast_port(port_b)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();
    let node_b = DiscoveryNode::builder(loopback_config("AMS-AUTH-SERVICE", 18102))
        .interface_source(loopback_interfaces())
        .listener_socket(socket_b)
        .broadcast_port(port_a)
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let id_a = instance_id_for("AMS-AUTH-SERVICE", "127.0.0.1", 18101);
    let id_b = instance_id_for("AMS-AUTH-SERVICE", "127.0.0.1", 18102);
    assert_eq!(node_a.registry().self_id(), id_a);

    let registry_a = node_a.registry().clone();
    let registry_b = node_b.registry().clone();
    assert!(eventually(WAIT, || registry_a.get(&id_b).is_some()).await);
    assert!(eventually(WAIT, || registry_b.get(&id_a).is_some()).await);

    let seen_by_b = registry_b.get(&id_a).unwrap();
    assert_eq!(seen_by_b.status, ServiceStatus::Healthy);
    assert_eq!(seen_by_b.grpc_port, 19101);

    // Own record is healthy once the first broadcast went out
    assert!(eventually(WAIT, || {
        registry_a.get(&id_a).map(|r| r.status) == Some(ServiceStatus::Healthy)
    })
    .await);

    // A running node only ever hands out its peer
    let candidates: Vec<String> = registry_a
        .healthy_instances()
        .into_iter()
        .map(|r| r.instance_id)
        .collect();
    assert_eq!(candidates, vec![id_b.clone()]);
    for _ in 0..100 {
        assert_eq!(registry_a.select_instance().unwrap().instance_id, id_b);
    }

    let snapshot = registry_b.snapshot();
    assert_eq!(snapshot.self_record.instance_id, id_b);
    assert_eq!(snapshot.peer_count(), 1);
    assert!(snapshot.active_interfaces.contains("lo"));

    let report = node_a.shutdown().await;
    assert!(report.is_clean());

    assert!(eventually(WAIT, || {
        registry_b.get(&id_a).map(|r| r.status) == Some(ServiceStatus::Stopping)
    })
    .await);
    assert!(registry_b.select_instance().is_none());

    let report = node_b.shutdown().await;
    assert!(report.is_clean());
}

#[tokio::test]
async fn test_silent_peer_goes_unhealthy_then_evicted() {
    let clock = ManualClock::starting_now();
    let sink = loopback_socket().await;

    let node = DiscoveryNode::builder(loopback_config("AMS-GATEWAY", 18201))
        .interface_source(loopback_interfaces())
        .clock(Arc::new(clock.clone()))
        .listener_socket(loopback_socket().await)
        .broadcast_port(sink.local_addr().unwrap().port())
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let target = node.listener_addr().unwrap();
    let peer = loopback_socket().await;
    peer.send_to(SAMPLE_DATAGRAM.as_bytes(), target).await.unwrap();

    let registry = node.registry().clone();
    assert!(eventually(WAIT, || registry.get(SAMPLE_PEER_ID).is_some()).await);
    assert_eq!(registry.get(SAMPLE_PEER_ID).unwrap().status, ServiceStatus::Healthy);

    clock.advance_secs(121);
    let report = node.heartbeat_monitor().sweep();
    assert!(report.marked_unhealthy.contains(&SAMPLE_PEER_ID.to_string()));
    assert_eq!(registry.get(SAMPLE_PEER_ID).unwrap().status, ServiceStatus::Unhealthy);

    clock.advance_secs(120);
    let report = node.heartbeat_monitor().sweep();
    assert!(report.evicted.contains(&SAMPLE_PEER_ID.to_string()));
    assert!(registry.get(SAMPLE_PEER_ID).is_none());

    node.shutdown().await;
}

#[tokio::test]
async fn test_stopping_datagram_updates_status() {
    let sink = loopback_socket().await;
    let node = DiscoveryNode::builder(loopback_config("AMS-GATEWAY", 18301))
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
    let registry = node.registry().clone();

    peer.send_to(SAMPLE_DATAGRAM.as_bytes(), target).await.unwrap();
    assert!(eventually(WAIT, || registry.get(SAMPLE_PEER_ID).is_some()).await);

    peer.send_to(SAMPLE_STOPPING_DATAGRAM.as_bytes(), target).await.unwrap();
    assert!(eventually(WAIT, || {
        registry.get(SAMPLE_PEER_ID).map(|r| r.status) == Some(ServiceStatus::Stopping)
    })
    .await);
    assert!(registry.healthy_instances().is_empty());

    node.shutdown().await;
}

/// Interface source whose answer can be swapped mid-test
struct SwitchableInterfaces {
    current: Mutex<Vec<InterfaceInfo>>,
}

impl SwitchableInterfaces {
    fn loopback() -> Self {
        Self {
            current: Mutex::new(vec![lo()]),
        }
    }

    fn set(&self, interfaces: Vec<InterfaceInfo>) {
        *self.current.lock().unwrap() = interfaces;
    }
}

impl InterfaceSource for SwitchableInterfaces {
    fn interfaces(&self) -> io::Result<Vec<InterfaceInfo>> {
        Ok(self.current.lock().unwrap().clone())
    }
}

fn lo() -> InterfaceInfo {
    InterfaceInfo::new(
        "lo",
        Ipv4Addr::LOCALHOST,
        Ipv4Addr::new(255, 0, 0, 0),
        Some(Ipv4Addr::LOCALHOST),
    )
}

#[tokio::test]
async fn test_network_change_clears_discovered_peers() {
    let interfaces = Arc::new(SwitchableInterfaces::loopback());
    let sink = loopback_socket().await;

    let mut config = loopback_config("AMS-GATEWAY", 18401);
    config.interface_poll_interval_secs = 1;

    let node = DiscoveryNode::builder(config)
        .interface_source(interfaces.clone())
        .listener_socket(loopback_socket().await)
        .broadcast_port(sink.local_addr().unwrap().port())
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let target = node.listener_addr().unwrap();
    let peer = loopback_socket().await;
    let registry = node.registry().clone();

    peer.send_to(SAMPLE_DATAGRAM.as_bytes(), target).await.unwrap();
    assert!(eventually(WAIT, || registry.get(SAMPLE_PEER_ID).is_some()).await);

    interfaces.set(vec![
        lo(),
        InterfaceInfo::new(
            "eth-test",
            Ipv4Addr::new(10, 99, 0, 2),
            Ipv4Addr::new(255, 255, 255, 0),
            None,
        ),
    ]);

    assert!(eventually(WAIT, || registry.get(SAMPLE_PEER_ID).is_none()).await);
    assert!(eventually(WAIT, || registry.active_interfaces().contains("eth-test")).await);

    // Own record is local and survives the change
    assert!(registry.get(registry.self_id()).is_some());

    node.shutdown().await;
}
