//! Liveness sweep over the record store
//!
//! Per record, driven by time since `last_heartbeat`:
//!
//! ```text
//!   elapsed < liveness            -> left as is
//!   liveness <= elapsed < 2x      -> UNHEALTHY (logged once, on the transition)
//!   elapsed >= 2x liveness        -> evicted
//! ```
//!
//! Promotion back to `HEALTHY` only happens on a new sighting, heartbeat or
//! successful health report, never here. The sweep reads timestamps only and
//! performs no I/O.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::store::ServiceRecordStore;
use crate::clock::SharedClock;
use crate::metrics;
use crate::models::ServiceStatus;

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Records that crossed the liveness timeout during this sweep
    pub marked_unhealthy: Vec<String>,

    /// Records removed for exceeding the staleness timeout
    pub evicted: Vec<String>,

    /// Records left in the store
    pub remaining: usize,
}

impl SweepReport {
    pub fn is_quiet(&self) -> bool {
        self.marked_unhealthy.is_empty() && self.evicted.is_empty()
    }
}

/// Marks silent instances unhealthy and evicts stale ones
pub struct HeartbeatMonitor {
    store: Arc<ServiceRecordStore>,
    clock: SharedClock,
    liveness_timeout: Duration,
    staleness_timeout: Duration,
}

impl HeartbeatMonitor {
    /// Timeouts too large for a `Duration` saturate, so such records never expire
    pub fn new(store: Arc<ServiceRecordStore>, clock: SharedClock, liveness_timeout_secs: u64) -> Self {
        let liveness_timeout = i64::try_from(liveness_timeout_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let staleness_timeout = liveness_timeout.checked_mul(2).unwrap_or(Duration::MAX);

        Self {
            store,
            clock,
            liveness_timeout,
            staleness_timeout,
        }
    }

    pub fn liveness_timeout(&self) -> Duration {
        self.liveness_timeout
    }

    /// Eviction threshold, twice the liveness timeout
    pub fn staleness_timeout(&self) -> Duration {
        self.staleness_timeout
    }

    /// Sweep using the monitor's clock
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(self.clock.now())
    }

    /// Sweep as of `now`
    pub fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let liveness = self.liveness_timeout;
        let staleness = self.staleness_timeout();
        let mut report = SweepReport::default();

        self.store.retain(|instance_id, record| {
            let elapsed = record.since_heartbeat(now);

            if elapsed >= staleness {
                tracing::info!(
                    instance = %instance_id,
                    last_heartbeat = %record.last_heartbeat,
                    "Removing stale service instance"
                );
                report.evicted.push(instance_id.clone());
                return false;
            }

            if elapsed >= liveness && record.status.can_expire() {
                record.status = ServiceStatus::Unhealthy;
                tracing::info!(
                    instance = %instance_id,
                    silent_secs = elapsed.num_seconds(),
                    "Service instance marked unhealthy"
                );
                report.marked_unhealthy.push(instance_id.clone());
            }

            true
        });

        report.remaining = self.store.len();
        metrics::record_sweep(report.marked_unhealthy.len(), report.evicted.len());

        if !report.is_quiet() {
            tracing::debug!(
                unhealthy = report.marked_unhealthy.len(),
                evicted = report.evicted.len(),
                remaining = report.remaining,
                "Heartbeat sweep finished"
            );
        }

        report
    }
}
