//! Integration tests module
//!
//! End-to-end tests for lanbeacon, including:
//! - Registry lifecycle: sighting, liveness sweep, eviction
//! - Weighted selection over health reports
//! - Two nodes discovering each other over loopback
//! - Malformed datagrams and failed binds

pub mod discovery_test;
pub mod error_scenarios;
pub mod fixtures;
pub mod registry_test;
