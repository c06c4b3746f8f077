//! Prometheus metrics for the discovery node and registry
//!
//! This module provides metrics tracking for:
//! - Registry: registered/healthy instances, health reports, selections, sweeps
//! - Discovery: broadcasts, received datagrams, interface changes
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all registry metrics
struct RegistryMetrics {
    registered_instances: Gauge,
    healthy_instances: Gauge,
    evictions: Counter,
    unhealthy_transitions: Counter,
    health_reports: CounterVec,
    selections: CounterVec,
}

/// Container for all discovery metrics
struct DiscoveryMetrics {
    broadcasts_sent: Counter,
    broadcasts_failed: Counter,
    datagrams: CounterVec,
    network_changes: Counter,
    active_interfaces: Gauge,
}

/// Global storage for registry metrics
static REGISTRY_METRICS: OnceLock<RegistryMetrics> = OnceLock::new();

/// Global storage for discovery metrics
static DISCOVERY_METRICS: OnceLock<DiscoveryMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Call once at startup. If registration fails the error is returned and
/// every `record_*` function stays a no-op.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = lanbeacon::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let registry = RegistryMetrics {
        registered_instances: register_gauge!(
            "lanbeacon_registry_registered_instances",
            "Number of service records held by the registry"
        )?,
        healthy_instances: register_gauge!(
            "lanbeacon_registry_healthy_instances",
            "Number of service records currently HEALTHY"
        )?,
        evictions: register_counter!(
            "lanbeacon_registry_evictions_total",
            "Total records evicted for exceeding the staleness timeout"
        )?,
        unhealthy_transitions: register_counter!(
            "lanbeacon_registry_unhealthy_transitions_total",
            "Total records marked UNHEALTHY by the liveness sweep"
        )?,
        health_reports: register_counter_vec!(
            "lanbeacon_registry_health_reports_total",
            "Total health reports by reported status",
            &["status"]
        )?,
        selections: register_counter_vec!(
            "lanbeacon_registry_selections_total",
            "Total instance selections by outcome",
            &["outcome"]
        )?,
    };

    let discovery = DiscoveryMetrics {
        broadcasts_sent: register_counter!(
            "lanbeacon_discovery_broadcasts_sent_total",
            "Total descriptor datagrams sent"
        )?,
        broadcasts_failed: register_counter!(
            "lanbeacon_discovery_broadcasts_failed_total",
            "Total descriptor datagrams that failed to send"
        )?,
        datagrams: register_counter_vec!(
            "lanbeacon_discovery_datagrams_total",
            "Total received datagrams by outcome",
            &["outcome"]
        )?,
        network_changes: register_counter!(
            "lanbeacon_discovery_network_changes_total",
            "Total detected changes of the active interface set"
        )?,
        active_interfaces: register_gauge!(
            "lanbeacon_discovery_active_interfaces",
            "Number of interfaces currently used for broadcasting"
        )?,
    };

    REGISTRY_METRICS.set(registry).map_err(|_| "Registry metrics already initialized")?;
    DISCOVERY_METRICS.set(discovery).map_err(|_| "Discovery metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    REGISTRY_METRICS.get().is_some() && DISCOVERY_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Update registry size gauges
pub fn update_registry_gauges(registered: usize, healthy: usize) {
    if let Some(m) = REGISTRY_METRICS.get() {
        m.registered_instances.set(registered as f64);
        m.healthy_instances.set(healthy as f64);
    }
}

/// Record the outcome of one heartbeat sweep
pub fn record_sweep(marked_unhealthy: usize, evicted: usize) {
    let Some(m) = REGISTRY_METRICS.get() else {
        return;
    };

    if marked_unhealthy > 0 {
        m.unhealthy_transitions.inc_by(marked_unhealthy as f64);
    }
    if evicted > 0 {
        m.evictions.inc_by(evicted as f64);
    }
}

/// Record a health report
pub fn record_health_report(status: &str) {
    if let Some(m) = REGISTRY_METRICS.get() {
        m.health_reports.with_label_values(&[status]).inc();
    }
}

/// Record a selection attempt
pub fn record_selection(found: bool) {
    if let Some(m) = REGISTRY_METRICS.get() {
        let outcome = if found { "selected" } else { "not_found" };
        m.selections.with_label_values(&[outcome]).inc();
    }
}

/// Record one broadcast round
pub fn record_broadcast(sent: usize, failed: usize) {
    let Some(m) = DISCOVERY_METRICS.get() else {
        return;
    };

    if sent > 0 {
        m.broadcasts_sent.inc_by(sent as f64);
    }
    if failed > 0 {
        m.broadcasts_failed.inc_by(failed as f64);
    }
}

/// Record a received datagram (`accepted`, `self` or `malformed`)
pub fn record_datagram(outcome: &str) {
    if let Some(m) = DISCOVERY_METRICS.get() {
        m.datagrams.with_label_values(&[outcome]).inc();
    }
}

/// Record a change of the active interface set
pub fn record_network_change(active_interfaces: usize) {
    let Some(m) = DISCOVERY_METRICS.get() else {
        return;
    };

    m.network_changes.inc();
    m.active_interfaces.set(active_interfaces as f64);
}

// ============================================================================
// Tests
// ============================================================================
