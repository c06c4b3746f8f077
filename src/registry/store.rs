//! Concurrent in-memory record store
//!
//! The listener, the heartbeat monitor and the registry facade all write here
//! concurrently while the balancer and snapshot queries read. `DashMap` shards
//! the map behind internal locks, so every per-record read-modify-write below
//! (sighting, health report, sweep) runs under that record's shard lock and
//! cannot lose a concurrent update.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::record::{RecordOrigin, ServiceRecord, SightingOutcome};
use crate::models::PeerDescriptor;

/// Store of every instance this process has heard from, keyed by instance id
#[derive(Debug, Default)]
pub struct ServiceRecordStore {
    records: DashMap<String, ServiceRecord>,
}

impl ServiceRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the record for a broadcasting peer
    pub fn upsert_sighting(&self, descriptor: &PeerDescriptor, now: DateTime<Utc>) -> SightingOutcome {
        match self.records.entry(descriptor.instance_id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().apply_sighting(descriptor, now),
            Entry::Vacant(entry) => {
                entry.insert(ServiceRecord::discovered(descriptor, now));
                SightingOutcome::Inserted
            }
        }
    }

    /// Insert or replace a record, returning the previous one
    pub fn insert(&self, record: ServiceRecord) -> Option<ServiceRecord> {
        self.records.insert(record.instance_id.clone(), record)
    }

    pub fn remove(&self, instance_id: &str) -> Option<ServiceRecord> {
        self.records.remove(instance_id).map(|(_, record)| record)
    }

    /// Copy of a single record
    pub fn get(&self, instance_id: &str) -> Option<ServiceRecord> {
        self.records.get(instance_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, instance_id: &str) -> bool {
        self.records.contains_key(instance_id)
    }

    /// Atomically modify one record. Returns `None` when the id is unknown.
    pub fn update<R>(&self, instance_id: &str, f: impl FnOnce(&mut ServiceRecord) -> R) -> Option<R> {
        self.records
            .get_mut(instance_id)
            .map(|mut entry| f(entry.value_mut()))
    }

    /// Copies of all records matching a predicate
    pub fn filter(&self, mut predicate: impl FnMut(&ServiceRecord) -> bool) -> Vec<ServiceRecord> {
        self.records
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Copies of all records
    pub fn records(&self) -> Vec<ServiceRecord> {
        self.filter(|_| true)
    }

    /// Copies of records eligible for selection
    pub fn healthy(&self) -> Vec<ServiceRecord> {
        self.filter(|r| r.status.is_selectable())
    }

    /// Keep only records for which `keep` returns true; `keep` may also edit them
    pub fn retain(&self, keep: impl FnMut(&String, &mut ServiceRecord) -> bool) {
        self.records.retain(keep);
    }

    /// Drop every record learned from the network. Returns how many were removed.
    pub fn clear_discovered(&self) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = record.origin != RecordOrigin::Discovered;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
