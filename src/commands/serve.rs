use anyhow::{Context, Result};
use std::path::PathBuf;

use lanbeacon::api::{self, AppState};
use lanbeacon::discovery::DiscoveryNode;
use lanbeacon::metrics;

/// Parameters for the serve command
#[derive(Debug, Clone, Default)]
pub struct ServeParams {
    pub config: Option<PathBuf>,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
}

/// Run the discovery node and HTTP API until Ctrl+C
pub async fn serve(params: ServeParams) -> Result<()> {
    let mut config = super::load_config(params.config.as_deref())?;
    if let Some(host) = params.api_host {
        config.api.host = host;
    }
    if let Some(port) = params.api_port {
        config.api.port = Some(port);
    }
    config.validate().context("Invalid configuration")?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!("Metrics initialization failed: {}", e);
    }

    let api_addr = config.api_addr()?;
    let handle = DiscoveryNode::builder(config.discovery.clone())
        .build()
        .context("Failed to configure discovery node")?
        .start()
        .await
        .context("Failed to start discovery node")?;

    let registry = handle.registry();
    println!("lanbeacon node started");
    println!("  Instance:       {}", registry.self_id());
    println!("  Discovery port: {}", config.discovery.discovery_port);
    println!("  HTTP API:       http://{}", api_addr);
    println!("Press Ctrl+C to stop");

    let state = AppState::new(registry.clone(), handle.started_at());
    let router = api::build_router(state, config.api.enable_cors);

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, shutting down");
        }
    };

    if let Err(e) = api::serve(api_addr, router, shutdown).await {
        tracing::error!("HTTP API disabled: {}", e);
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
    }

    let report = handle.shutdown().await;
    println!(
        "Stopped ({} tasks finished, {} aborted)",
        report.completed.len(),
        report.aborted.len()
    );
    Ok(())
}
