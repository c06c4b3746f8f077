//! Receive loop for peer broadcasts

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use super::NodeError;
use crate::metrics;
use crate::registry::{ServiceRegistry, SightingOutcome};
use crate::wire;

/// What happened to one received datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatagramOutcome {
    Accepted(SightingOutcome),
    OwnBroadcast,
    Malformed,
}

impl DatagramOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted(_) => "accepted",
            Self::OwnBroadcast => "self",
            Self::Malformed => "malformed",
        }
    }
}

/// Feeds peer descriptors from the discovery port into the registry.
///
/// Owns the receiving socket exclusively. Receives are bounded by
/// `receive_timeout` so the shutdown flag is checked at least that often.
pub struct Listener {
    socket: UdpSocket,
    registry: Arc<ServiceRegistry>,
    receive_timeout: Duration,
    max_datagram_bytes: usize,
}

impl Listener {
    /// Bind `0.0.0.0:port`
    pub async fn bind(
        port: u16,
        registry: Arc<ServiceRegistry>,
        receive_timeout: Duration,
        max_datagram_bytes: usize,
    ) -> Result<Self, NodeError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        let socket = UdpSocket::bind(addr).await.map_err(|source| NodeError::Bind {
            role: "listener",
            addr,
            source,
        })?;
        Ok(Self::from_socket(socket, registry, receive_timeout, max_datagram_bytes))
    }

    /// Use an already bound socket
    pub fn from_socket(
        socket: UdpSocket,
        registry: Arc<ServiceRegistry>,
        receive_timeout: Duration,
        max_datagram_bytes: usize,
    ) -> Self {
        Self {
            socket,
            registry,
            receive_timeout,
            max_datagram_bytes,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    /// Receive until `shutdown` turns `true`
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; self.max_datagram_bytes];

        tracing::info!(addr = ?self.local_addr(), "Discovery listener started");

        while !*shutdown.borrow() {
            match tokio::time::timeout(self.receive_timeout, self.socket.recv_from(&mut buf)).await {
                Err(_) => continue,
                Ok(Ok((len, from))) => {
                    self.handle_datagram(&buf[..len], from);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Discovery receive failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }

        tracing::info!("Discovery listener shutting down");
    }

    /// Decode one datagram and fold it into the registry
    pub fn handle_datagram(&self, payload: &[u8], from: SocketAddr) -> DatagramOutcome {
        let outcome = match wire::decode(payload) {
            Err(e) => {
                tracing::debug!(from = %from, bytes = payload.len(), "Dropping malformed datagram: {}", e);
                DatagramOutcome::Malformed
            }
            Ok(descriptor) => match self.registry.observe(&descriptor) {
                Some(sighting) => DatagramOutcome::Accepted(sighting),
                None => DatagramOutcome::OwnBroadcast,
            },
        };

        metrics::record_datagram(outcome.as_str());
        outcome
    }
}
