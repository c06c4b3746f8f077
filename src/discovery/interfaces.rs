//! Network interface enumeration and change detection

use if_addrs::IfAddr;
use std::collections::BTreeSet;
use std::io;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::metrics;

/// One IPv4 address on a non-loopback interface
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InterfaceInfo {
    pub name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// Broadcast address as reported by the OS
    pub broadcast: Option<Ipv4Addr>,
}

impl InterfaceInfo {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr, netmask: Ipv4Addr, broadcast: Option<Ipv4Addr>) -> Self {
        Self {
            name: name.into(),
            ip,
            netmask,
            broadcast,
        }
    }

    /// Where to send this interface's broadcasts, if anywhere
    pub fn broadcast_address(&self) -> Option<Ipv4Addr> {
        broadcast_address(self.ip, self.netmask, self.broadcast)
    }

    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask).count_ones()
    }
}

/// Subnet broadcast address for an interface.
///
/// Prefers the OS-reported value. Otherwise computes `ip | !netmask`, except
/// for /31 and /32 networks which have no broadcast address.
pub fn broadcast_address(ip: Ipv4Addr, netmask: Ipv4Addr, reported: Option<Ipv4Addr>) -> Option<Ipv4Addr> {
    if let Some(addr) = reported.filter(|a| !a.is_unspecified()) {
        return Some(addr);
    }

    let mask = u32::from(netmask);
    if mask.count_ones() >= 31 {
        return None;
    }

    Some(Ipv4Addr::from(u32::from(ip) | !mask))
}

/// Source of interface information
pub trait InterfaceSource: Send + Sync {
    /// Non-loopback interfaces that currently carry an IPv4 address
    fn interfaces(&self) -> io::Result<Vec<InterfaceInfo>>;
}

/// Reads interfaces from the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interfaces(&self) -> io::Result<Vec<InterfaceInfo>> {
        let interfaces = if_addrs::get_if_addrs()?
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .filter_map(|iface| match iface.addr {
                IfAddr::V4(v4) => Some(InterfaceInfo::new(iface.name, v4.ip, v4.netmask, v4.broadcast)),
                IfAddr::V6(_) => None,
            })
            .collect();
        Ok(interfaces)
    }
}

/// Distinct interface names
pub fn interface_names(interfaces: &[InterfaceInfo]) -> BTreeSet<String> {
    interfaces.iter().map(|i| i.name.clone()).collect()
}

/// Address this node announces: the first non-loopback IPv4 address
pub fn select_local_ipv4(interfaces: &[InterfaceInfo]) -> Option<Ipv4Addr> {
    interfaces
        .iter()
        .map(|i| i.ip)
        .find(|ip| !ip.is_loopback() && !ip.is_unspecified() && !ip.is_link_local())
        .or_else(|| interfaces.first().map(|i| i.ip))
}

/// Difference between two interface name sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceChange {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl InterfaceChange {
    pub fn between(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Self {
        Self {
            added: current.difference(previous).cloned().collect(),
            removed: previous.difference(current).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Polls an [`InterfaceSource`] and publishes the active set
pub struct InterfaceMonitor {
    source: Arc<dyn InterfaceSource>,
    active: watch::Sender<Vec<InterfaceInfo>>,
    names: watch::Sender<BTreeSet<String>>,
    initialized: AtomicBool,
}

impl InterfaceMonitor {
    pub fn new(source: Arc<dyn InterfaceSource>) -> Self {
        let (active, _) = watch::channel(Vec::new());
        let (names, _) = watch::channel(BTreeSet::new());
        Self {
            source,
            active,
            names,
            initialized: AtomicBool::new(false),
        }
    }

    /// Active interfaces, updated after every poll that saw a change
    pub fn subscribe(&self) -> watch::Receiver<Vec<InterfaceInfo>> {
        self.active.subscribe()
    }

    /// Active interface names
    pub fn subscribe_names(&self) -> watch::Receiver<BTreeSet<String>> {
        self.names.subscribe()
    }

    pub fn current(&self) -> Vec<InterfaceInfo> {
        self.active.borrow().clone()
    }

    /// Enumerate interfaces and diff against the previous poll.
    ///
    /// Returns the change when the set of names differs. The first poll only
    /// seeds the state. An enumeration failure keeps the previous state.
    pub fn poll(&self) -> Option<InterfaceChange> {
        let interfaces = match self.source.interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                tracing::warn!("Failed to enumerate network interfaces: {}", e);
                return None;
            }
        };

        let current = interface_names(&interfaces);
        let previous = self.names.borrow().clone();
        let change = InterfaceChange::between(&previous, &current);
        let addresses_changed = *self.active.borrow() != interfaces;

        if addresses_changed {
            self.active.send_replace(interfaces);
        }

        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::info!(interfaces = ?current, "Active network interfaces");
            self.names.send_replace(current);
            return None;
        }

        if change.is_empty() {
            if addresses_changed {
                tracing::debug!("Interface addresses changed");
            }
            return None;
        }

        for name in &change.added {
            tracing::info!(interface = %name, "Network interface added");
        }
        for name in &change.removed {
            tracing::info!(interface = %name, "Network interface removed");
        }

        metrics::record_network_change(current.len());
        self.names.send_replace(current);
        Some(change)
    }
}
