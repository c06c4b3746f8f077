//! Test fixtures for integration tests
//!
//! Sample datagrams and helpers for building nodes on loopback

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use lanbeacon::config::DiscoveryConfig;
use lanbeacon::discovery::{InterfaceInfo, InterfaceSource};
use tokio::net::UdpSocket;

/// Datagram from a peer in the deployed JSON format
pub const SAMPLE_DATAGRAM: &str = r#"{
    "serviceId": "AMS-AUTH-SERVICE-10.20.0.5-8081",
    "serviceName": "AMS-AUTH-SERVICE",
    "ipAddress": "10.20.0.5",
    "httpPort": 8081,
    "grpcPort": 9091,
    "timestamp": 1718000000000,
    "version": "1.0.0",
    "status": "ACTIVE"
}"#;

/// Same peer announcing departure
pub const SAMPLE_STOPPING_DATAGRAM: &str = r#"{
    "serviceId": "AMS-AUTH-SERVICE-10.20.0.5-8081",
    "serviceName": "AMS-AUTH-SERVICE",
    "ipAddress": "10.20.0.5",
    "httpPort": 8081,
    "grpcPort": 9091,
    "timestamp": 1718000030000,
    "version": "1.0.0",
    "status": "STOPPING"
}"#;

pub const SAMPLE_PEER_ID: &str = "AMS-AUTH-SERVICE-10.20.0.5-8081";

/// Datagrams that must be dropped without touching the registry
pub const MALFORMED_DATAGRAMS: &[&str] = &[
    "",
    "hello",
    "{",
    r#"{"serviceName":"x"}"#,
    r#"{"serviceId":"","serviceName":"x","ipAddress":"1.2.3.4","httpPort":1}"#,
    r#"{"serviceId":"a","serviceName":"x","ipAddress":"1.2.3.4","httpPort":"eighty"}"#,
];

/// Interface source that always reports loopback with broadcast 127.0.0.1
pub struct LoopbackInterfaces;

impl InterfaceSource for LoopbackInterfaces {
    fn interfaces(&self) -> io::Result<Vec<InterfaceInfo>> {
        Ok(vec![InterfaceInfo::new(
            "lo",
            Ipv4Addr::LOCALHOST,
            Ipv4Addr::new(255, 0, 0, 0),
            Some(Ipv4Addr::LOCALHOST),
        )])
    }
}

pub fn loopback_interfaces() -> Arc<dyn InterfaceSource> {
    Arc::new(LoopbackInterfaces)
}

/// Config for a node on loopback with fast timers
pub fn loopback_config(name: &str, http_port: u16) -> DiscoveryConfig {
    DiscoveryConfig::builder()
        .service_name(name)
        .http_port(http_port)
        .grpc_port(http_port + 1000)
        .advertise_address("127.0.0.1")
        .broadcast_interval_secs(1)
        .liveness_timeout_secs(120)
        .receive_timeout_millis(50)
        .send_timeout_millis(500)
        .shutdown_grace_secs(2)
        .build()
        .expect("loopback config should be valid")
}

/// Socket bound to an ephemeral loopback port
pub async fn loopback_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("bind loopback socket")
}

/// Poll `check` until it holds or `within` elapses
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}
