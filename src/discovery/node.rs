//! Discovery node: wires the registry, sockets and background tasks together

use chrono::{DateTime, Utc};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::Notify;

use super::broadcaster::Broadcaster;
use super::interfaces::{select_local_ipv4, InterfaceMonitor, InterfaceSource, SystemInterfaces};
use super::listener::Listener;
use super::NodeError;
use crate::clock::{SharedClock, SystemClock};
use crate::config::DiscoveryConfig;
use crate::models::{PeerDescriptor, ServiceStatus};
use crate::registry::{HeartbeatMonitor, ServiceRecordStore, ServiceRegistry};
use crate::scheduler::{ShutdownReport, TaskScheduler};

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`DiscoveryNode`]
pub struct DiscoveryNodeBuilder {
    config: DiscoveryConfig,
    interface_source: Option<Arc<dyn InterfaceSource>>,
    clock: Option<SharedClock>,
    listener_socket: Option<UdpSocket>,
    broadcast_port: Option<u16>,
}

impl DiscoveryNodeBuilder {
    /// Interface source (defaults to the operating system)
    pub fn interface_source(mut self, source: Arc<dyn InterfaceSource>) -> Self {
        self.interface_source = Some(source);
        self
    }

    /// Clock for record timestamps (defaults to the system clock)
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receive on this socket instead of binding the discovery port
    pub fn listener_socket(mut self, socket: UdpSocket) -> Self {
        self.listener_socket = Some(socket);
        self
    }

    /// Send broadcasts to this port instead of the discovery port
    pub fn broadcast_port(mut self, port: u16) -> Self {
        self.broadcast_port = Some(port);
        self
    }

    /// Resolve identity and create the registry. No sockets are opened yet.
    pub fn build(self) -> Result<DiscoveryNode, NodeError> {
        self.config.validate()?;

        let source = self
            .interface_source
            .unwrap_or_else(|| Arc::new(SystemInterfaces));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let interface_monitor = Arc::new(InterfaceMonitor::new(source));
        interface_monitor.poll();

        let ip = self
            .config
            .advertise_ip()
            .or_else(|| select_local_ipv4(&interface_monitor.current()))
            .unwrap_or_else(|| {
                tracing::warn!("No non-loopback IPv4 address found, announcing 127.0.0.1");
                Ipv4Addr::LOCALHOST
            });

        let identity = PeerDescriptor::new(
            &self.config.service_name,
            &ip.to_string(),
            self.config.http_port,
            self.config.grpc_port,
            clock.now_millis(),
        )
        .with_schema_version(&self.config.schema_version);

        let store = Arc::new(ServiceRecordStore::new());
        let registry = Arc::new(
            ServiceRegistry::new(identity, store.clone(), clock.clone(), self.config.registry_settings())
                .with_interfaces(interface_monitor.subscribe_names()),
        );
        let heartbeat_monitor = Arc::new(HeartbeatMonitor::new(
            store,
            clock,
            self.config.liveness_timeout_secs,
        ));

        let broadcast_port = self.broadcast_port.unwrap_or(self.config.discovery_port);

        Ok(DiscoveryNode {
            config: self.config,
            registry,
            heartbeat_monitor,
            interface_monitor,
            listener_socket: self.listener_socket,
            broadcast_port,
        })
    }
}

// ============================================================================
// Discovery Node
// ============================================================================

/// A configured, not yet running discovery node
pub struct DiscoveryNode {
    config: DiscoveryConfig,
    registry: Arc<ServiceRegistry>,
    heartbeat_monitor: Arc<HeartbeatMonitor>,
    interface_monitor: Arc<InterfaceMonitor>,
    listener_socket: Option<UdpSocket>,
    broadcast_port: u16,
}

impl DiscoveryNode {
    pub fn builder(config: DiscoveryConfig) -> DiscoveryNodeBuilder {
        DiscoveryNodeBuilder {
            config,
            interface_source: None,
            clock: None,
            listener_socket: None,
            broadcast_port: None,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn interface_monitor(&self) -> &Arc<InterfaceMonitor> {
        &self.interface_monitor
    }

    /// Register this node and start all background tasks.
    ///
    /// A socket that cannot be bound disables its component with an error
    /// log; the rest of the node keeps running.
    pub async fn start(self) -> Result<NodeHandle, NodeError> {
        let config = self.config;
        let registry = self.registry;
        let started_at = registry.clock().now();

        registry.register_self()?;
        tracing::info!(
            instance = %registry.self_id(),
            discovery_port = config.discovery_port,
            "Starting discovery node"
        );

        let mut scheduler = TaskScheduler::new();
        let network_changed = Arc::new(Notify::new());

        // Interface monitor
        {
            let monitor = self.interface_monitor.clone();
            let registry = registry.clone();
            let network_changed = network_changed.clone();
            scheduler.spawn_periodic(
                "interface-monitor",
                config.interface_poll_interval(),
                None,
                move || {
                    if monitor.poll().is_some() {
                        registry.clear_discovered();
                        network_changed.notify_one();
                    }
                    std::future::ready(())
                },
            );
        }

        // Broadcaster
        let broadcaster = match Broadcaster::bind(
            registry.clone(),
            self.interface_monitor.subscribe(),
            self.broadcast_port,
            config.send_timeout(),
            config.max_datagram_bytes,
        )
        .await
        {
            Ok(broadcaster) => {
                let broadcaster = Arc::new(broadcaster);
                let task = broadcaster.clone();
                scheduler.spawn_periodic(
                    "broadcaster",
                    config.broadcast_interval(),
                    Some(network_changed),
                    move || {
                        let task = task.clone();
                        async move {
                            task.broadcast_once().await;
                        }
                    },
                );
                Some(broadcaster)
            }
            Err(e) => {
                tracing::error!("Broadcaster disabled: {}", e);
                None
            }
        };

        // Heartbeat monitor
        {
            let monitor = self.heartbeat_monitor.clone();
            scheduler.spawn_periodic(
                "heartbeat-monitor",
                config.heartbeat_check_interval(),
                None,
                move || {
                    monitor.sweep();
                    std::future::ready(())
                },
            );
        }

        // Listener
        let listener = match self.listener_socket {
            Some(socket) => Ok(Listener::from_socket(
                socket,
                registry.clone(),
                config.receive_timeout(),
                config.max_datagram_bytes,
            )),
            None => {
                Listener::bind(
                    config.discovery_port,
                    registry.clone(),
                    config.receive_timeout(),
                    config.max_datagram_bytes,
                )
                .await
            }
        };
        let listener_addr = match listener {
            Ok(listener) => {
                let addr = listener.local_addr();
                scheduler.spawn_loop("listener", move |shutdown| listener.run(shutdown));
                addr
            }
            Err(e) => {
                tracing::error!("Listener disabled: {}", e);
                None
            }
        };

        Ok(NodeHandle {
            registry,
            heartbeat_monitor: self.heartbeat_monitor,
            interface_monitor: self.interface_monitor,
            broadcaster,
            listener_addr,
            scheduler,
            started_at,
            grace: config.shutdown_grace(),
        })
    }
}

// ============================================================================
// Node Handle
// ============================================================================

/// Handle to a running discovery node
pub struct NodeHandle {
    registry: Arc<ServiceRegistry>,
    heartbeat_monitor: Arc<HeartbeatMonitor>,
    interface_monitor: Arc<InterfaceMonitor>,
    broadcaster: Option<Arc<Broadcaster>>,
    listener_addr: Option<SocketAddr>,
    scheduler: TaskScheduler,
    started_at: DateTime<Utc>,
    grace: std::time::Duration,
}

impl NodeHandle {
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn heartbeat_monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.heartbeat_monitor
    }

    pub fn interface_monitor(&self) -> &Arc<InterfaceMonitor> {
        &self.interface_monitor
    }

    /// Address the listener is bound to, if it is running
    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener_addr
    }

    pub fn is_broadcasting(&self) -> bool {
        self.broadcaster.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Names of background tasks still running
    pub fn running_tasks(&self) -> Vec<String> {
        self.scheduler.running_tasks()
    }

    /// Announce departure, stop every task and release the sockets.
    ///
    /// Bounded by the configured grace period; tasks still running after it
    /// are aborted.
    pub async fn shutdown(self) -> ShutdownReport {
        tracing::info!(instance = %self.registry.self_id(), "Stopping discovery node");

        // Periodic broadcasts refresh the self record; stop them before marking it STOPPING
        self.scheduler.signal_shutdown();
        let _ = self
            .registry
            .report_health(self.registry.self_id(), ServiceStatus::Stopping, 0);

        if let Some(broadcaster) = &self.broadcaster {
            let _ = tokio::time::timeout(self.grace, broadcaster.announce_departure()).await;
        }

        let report = self.scheduler.shutdown(self.grace).await;
        if report.is_clean() {
            tracing::info!(tasks = report.completed.len(), "Discovery node stopped");
        } else {
            tracing::warn!(aborted = ?report.aborted, "Discovery node stopped with aborted tasks");
        }
        report
    }
}
