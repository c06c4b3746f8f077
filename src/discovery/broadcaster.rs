//! Periodic UDP announcement of this node's descriptor

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use super::interfaces::InterfaceInfo;
use super::NodeError;
use crate::metrics;
use crate::models::{PeerDescriptor, STATUS_ACTIVE, STATUS_STOPPING};
use crate::registry::ServiceRegistry;
use crate::wire;

/// Outcome of one broadcast round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
    /// Interfaces without a usable broadcast address
    pub skipped: usize,
}

/// Sends this node's descriptor on every active interface.
///
/// Owns the sending socket exclusively.
pub struct Broadcaster {
    socket: UdpSocket,
    registry: Arc<ServiceRegistry>,
    interfaces: watch::Receiver<Vec<InterfaceInfo>>,
    target_port: u16,
    send_timeout: Duration,
    max_datagram_bytes: usize,
}

impl Broadcaster {
    /// Bind an ephemeral broadcast-enabled socket
    pub async fn bind(
        registry: Arc<ServiceRegistry>,
        interfaces: watch::Receiver<Vec<InterfaceInfo>>,
        target_port: u16,
        send_timeout: Duration,
        max_datagram_bytes: usize,
    ) -> Result<Self, NodeError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
        let socket = UdpSocket::bind(addr).await.map_err(|source| NodeError::Bind {
            role: "broadcast",
            addr,
            source,
        })?;
        socket.set_broadcast(true)?;

        Ok(Self {
            socket,
            registry,
            interfaces,
            target_port,
            send_timeout,
            max_datagram_bytes,
        })
    }

    pub fn target_port(&self) -> u16 {
        self.target_port
    }

    fn descriptor(&self, status: &str) -> PeerDescriptor {
        let mut descriptor = self.registry.identity().clone().with_status(status);
        descriptor.timestamp = self.registry.clock().now_millis();
        descriptor
    }

    /// One round over the active interfaces. A round with at least one
    /// successful send counts as this node's own heartbeat.
    pub async fn broadcast_once(&self) -> BroadcastReport {
        let report = self.send_all(&self.descriptor(STATUS_ACTIVE)).await;

        if report.sent > 0 {
            self.registry.refresh_self();
        }
        metrics::record_broadcast(report.sent, report.failed);

        if report.sent == 0 && report.failed == 0 {
            tracing::debug!(skipped = report.skipped, "No interface to broadcast on");
        } else {
            tracing::debug!(
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "Broadcast round finished"
            );
        }
        report
    }

    /// Best-effort `STOPPING` announcement sent once at shutdown
    pub async fn announce_departure(&self) -> BroadcastReport {
        let report = self.send_all(&self.descriptor(STATUS_STOPPING)).await;
        tracing::info!(sent = report.sent, "Announced departure");
        report
    }

    async fn send_all(&self, descriptor: &PeerDescriptor) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        let payload = match wire::encode_bounded(descriptor, self.max_datagram_bytes) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to encode own descriptor: {}", e);
                return report;
            }
        };

        let interfaces = self.interfaces.borrow().clone();
        for iface in &interfaces {
            let Some(broadcast) = iface.broadcast_address() else {
                tracing::debug!(
                    interface = %iface.name,
                    ip = %iface.ip,
                    prefix = iface.prefix_len(),
                    "Interface has no broadcast address, skipping"
                );
                report.skipped += 1;
                continue;
            };

            let target = SocketAddrV4::new(broadcast, self.target_port);
            match tokio::time::timeout(self.send_timeout, self.socket.send_to(&payload, target)).await {
                Ok(Ok(_)) => {
                    tracing::debug!(interface = %iface.name, target = %target, "Sent discovery broadcast");
                    report.sent += 1;
                }
                Ok(Err(e)) => {
                    tracing::warn!(interface = %iface.name, target = %target, "Broadcast failed: {}", e);
                    report.failed += 1;
                }
                Err(_) => {
                    tracing::warn!(interface = %iface.name, target = %target, "Broadcast timed out");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
