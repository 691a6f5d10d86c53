//! Route Gateway
//!
//! Composition root: loads configuration, builds the entrypoint and the
//! optional management API, and runs until a shutdown signal arrives.

use route_gateway::adapters::inbound::{ApiServer, TlsConfig};
use route_gateway::adapters::outbound::TracingAccessLogger;
use route_gateway::application::Entrypoint;
use route_gateway::config::{load_config, Config};
use route_gateway::infrastructure::{shutdown_signal, ShutdownController};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn load_tls(cfg: &Config) -> anyhow::Result<Option<TlsConfig>> {
    if let (Some(cert), Some(key)) = (&cfg.tls_cert_path, &cfg.tls_key_path) {
        let tls = TlsConfig::from_pem_files(Path::new(cert), Path::new(key))?;
        tracing::info!("TLS certificate loaded from {}", cert);
        return Ok(Some(tls));
    }
    if cfg.tls_self_signed {
        let tls = TlsConfig::self_signed(&cfg.tls_domain)?;
        tracing::warn!("using self-signed certificate for {}", cfg.tls_domain);
        return Ok(Some(tls));
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    let ep_config = cfg.entrypoint_config();
    tracing::info!(
        "starting route-gateway http={} https={} short_link_host={}",
        ep_config.http_addr(),
        ep_config.https_addr(),
        ep_config.short_link_host
    );

    // ===== COMPOSITION ROOT =====

    let tls = load_tls(&cfg)?;
    let entrypoint = Entrypoint::new(ep_config, tls);
    if cfg.access_log {
        entrypoint.set_access_logger(Some(Arc::new(TracingAccessLogger::new())));
    }

    let api_shutdown = ShutdownController::new();
    let api_handle = if cfg.api_enabled {
        let api = ApiServer::new(cfg.api_listen_addr.clone(), entrypoint.clone());
        let stop = api_shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api.run(async move { stop.wait_for_shutdown().await }).await {
                tracing::error!("management API failed: {:?}", e);
            }
        }))
    } else {
        None
    };

    shutdown_signal().await;

    api_shutdown.shutdown();
    entrypoint
        .shutdown(Duration::from_secs(cfg.shutdown_drain_secs))
        .await;
    if let Some(handle) = api_handle {
        let _ = handle.await;
    }

    tracing::info!("route-gateway stopped");
    Ok(())
}
