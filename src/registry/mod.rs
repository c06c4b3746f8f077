//! In-process service registry
//!
//! Holds one record per known service instance, whether it registered
//! locally or was learned from a peer broadcast, and answers "which healthy
//! instance should I call next?".
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             ServiceRegistry              │
//! │  register / unregister / heartbeat       │
//! │  report_health / set_maintenance         │
//! │  select_instance / snapshot / stats      │
//! └────────────┬──────────────────┬──────────┘
//!              │                  │
//!   ┌──────────▼─────────┐  ┌─────▼────────────┐
//!   │ ServiceRecordStore │  │ WeightedSelector │
//!   │  (DashMap, by id)  │  │  weight ∝ pick   │
//!   └──────────▲─────────┘  └──────────────────┘
//!              │
//!   ┌──────────┴─────────┐
//!   │  HeartbeatMonitor  │
//!   │  UNHEALTHY / evict │
//!   └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use lanbeacon::registry::{ServiceRegistry, ServiceRecordStore, RegistrySettings};
//!
//! let registry = ServiceRegistry::new(identity, store, clock, RegistrySettings::default());
//! if let Some(peer) = registry.select_instance() {
//!     // call peer.http_url(), then report back
//!     registry.report_health(&peer.instance_id, ServiceStatus::Healthy, 42)?;
//! }
//! ```

pub mod balancer;
pub mod facade;
pub mod heartbeat;
pub mod record;
pub mod snapshot;
pub mod store;

pub use balancer::WeightedSelector;
pub use facade::{RegistryError, RegistrySettings, RegistryStats, ServiceRegistry};
pub use heartbeat::{HeartbeatMonitor, SweepReport};
pub use record::{RecordOrigin, ServiceRecord, SightingOutcome};
pub use snapshot::{ConnectionInstructions, DiscoverySnapshot, MobileDiscovery};
pub use store::ServiceRecordStore;
