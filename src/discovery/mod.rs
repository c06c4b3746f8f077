//! LAN peer discovery over UDP broadcast
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────┐  active set   ┌──────────────┐   datagram   ┌──────────┐
//!  │ InterfaceMonitor │ ────────────▶ │ Broadcaster  │ ───────────▶ │   LAN    │
//!  │  poll every 10s  │ ─ changed ──▶ │  every 30s   │              └────┬─────┘
//!  └────────┬─────────┘               └──────────────┘                   │
//!           │ clear discovered                                           ▼
//!           ▼                                                     ┌──────────┐
//!  ┌──────────────────┐ ◀──────────── observe(descriptor) ──────  │ Listener │
//!  │ ServiceRegistry  │                                           └──────────┘
//!  └──────────────────┘ ◀── sweep every 60s ── HeartbeatMonitor
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lanbeacon::config::DiscoveryConfig;
//! use lanbeacon::discovery::DiscoveryNode;
//!
//! let node = DiscoveryNode::builder(DiscoveryConfig::default()).build()?;
//! let handle = node.start().await?;
//! let peer = handle.registry().select_instance();
//! handle.shutdown().await;
//! ```

pub mod broadcaster;
pub mod interfaces;
pub mod listener;
pub mod node;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use interfaces::{
    broadcast_address, InterfaceChange, InterfaceInfo, InterfaceMonitor, InterfaceSource,
    SystemInterfaces,
};
pub use listener::{DatagramOutcome, Listener};
pub use node::{DiscoveryNode, DiscoveryNodeBuilder, NodeHandle};

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::ConfigError;
use crate::registry::RegistryError;

/// Discovery node errors
#[derive(Error, Debug)]
pub enum NodeError {
    /// Socket could not be bound
    #[error("Failed to bind {role} socket on {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Socket option or other socket-level failure
    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl NodeError {
    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Bind { .. } | Self::Socket(_))
    }
}
