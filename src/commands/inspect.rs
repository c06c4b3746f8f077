use anyhow::{Context, Result};
use std::path::PathBuf;

use lanbeacon::discovery::{Broadcaster, DiscoveryNode, InterfaceSource, SystemInterfaces};

/// Print the active interfaces and where broadcasts would go
pub fn interfaces() -> Result<()> {
    let interfaces = SystemInterfaces
        .interfaces()
        .context("Failed to enumerate network interfaces")?;

    if interfaces.is_empty() {
        println!("No active non-loopback IPv4 interfaces");
        return Ok(());
    }

    println!("{:<16} {:<18} {:<18}", "INTERFACE", "ADDRESS", "BROADCAST");
    for iface in &interfaces {
        let broadcast = iface
            .broadcast_address()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<18} {:<18}",
            iface.name,
            format!("{}/{}", iface.ip, iface.prefix_len()),
            broadcast
        );
    }
    Ok(())
}

/// Broadcast this node's descriptor once
pub async fn announce(config: Option<PathBuf>, stopping: bool) -> Result<()> {
    let config = super::load_config(config.as_deref())?;
    let discovery = config.discovery;

    let node = DiscoveryNode::builder(discovery.clone())
        .build()
        .context("Failed to configure discovery node")?;

    let broadcaster = Broadcaster::bind(
        node.registry().clone(),
        node.interface_monitor().subscribe(),
        discovery.discovery_port,
        discovery.send_timeout(),
        discovery.max_datagram_bytes,
    )
    .await
    .context("Failed to open broadcast socket")?;

    let report = if stopping {
        broadcaster.announce_departure().await
    } else {
        broadcaster.broadcast_once().await
    };

    println!("Announced {}", node.registry().self_id());
    println!(
        "  sent: {}, failed: {}, skipped: {}",
        report.sent, report.failed, report.skipped
    );
    Ok(())
}
