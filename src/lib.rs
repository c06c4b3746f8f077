//! lanbeacon - zero-configuration service discovery for a local network
//!
//! Service instances on the same LAN announce themselves over UDP broadcast,
//! keep a best-effort registry of their peers, and pick a peer for outbound
//! calls by weighted random selection.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Peer descriptors and service status
//! - [`wire`] - Broadcast datagram encoding
//! - [`registry`] - Record store, heartbeat sweep, weighted selection
//! - [`discovery`] - Interface monitoring, broadcasting and listening
//! - [`scheduler`] - Background task lifecycle
//! - [`api`] - HTTP query surface
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use lanbeacon::config::Config;
//! use lanbeacon::discovery::DiscoveryNode;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let handle = DiscoveryNode::builder(config.discovery).build()?.start().await?;
//!     if let Some(peer) = handle.registry().select_instance() {
//!         println!("calling {}", peer.http_url());
//!     }
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod wire;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::config::{Config, DiscoveryConfig};
    pub use crate::discovery::{DiscoveryNode, NodeHandle};
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{PeerDescriptor, ServiceStatus};
    pub use crate::registry::{DiscoverySnapshot, ServiceRecord, ServiceRegistry};
}

// Direct re-exports for convenience
pub use models::{PeerDescriptor, ServiceStatus};
