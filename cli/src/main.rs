// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Mesh Broker
//!
//! The `aegis-mesh` binary runs a mesh broker node: it accepts signed
//! envelopes from agents, maintains the tool directory and federation
//! state, and serves discovery and routing decisions.
//!
//! ## Usage
//!
//! - `aegis-mesh --listen 0.0.0.0:4433` - run a broker on the given address
//! - Configuration file via `--config mesh.yaml`; flags and env override it
//! - The capability-token secret comes from `--token-secret` /
//!   `AEGIS_MESH_TOKEN_SECRET`; running on the built-in development
//!   default logs a loud warning at startup

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use aegis_mesh_core::application::{Dispatcher, FederationManager, KeyStore};
use aegis_mesh_core::config::MeshConfig;
use aegis_mesh_core::infrastructure::token_service::CapabilityTokenService;
use aegis_mesh_core::presentation;

/// AEGIS Mesh - federated tool broker for autonomous agents
#[derive(Parser)]
#[command(name = "aegis-mesh")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen address for the broker API
    #[arg(long, env = "AEGIS_MESH_LISTEN", default_value = "127.0.0.1:4433")]
    listen: String,

    /// Path to a YAML configuration file
    #[arg(short, long, env = "AEGIS_MESH_CONFIG", value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    /// Broker identity within the trust domain
    #[arg(long, env = "AEGIS_MESH_BROKER_ID")]
    broker_id: Option<String>,

    /// Capability-token secret shared across the trust domain
    #[arg(long, env = "AEGIS_MESH_TOKEN_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// Prometheus exporter address (disabled when unset)
    #[arg(long, env = "AEGIS_MESH_METRICS_LISTEN")]
    metrics_listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AEGIS_MESH_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = load_config(&cli)?;
    if config.uses_dev_secret() {
        warn!("running with the built-in development token secret; set AEGIS_MESH_TOKEN_SECRET before deploying");
    }

    if let Some(metrics_listen) = &cli.metrics_listen {
        let addr: std::net::SocketAddr = metrics_listen
            .parse()
            .context("Invalid metrics listen address")?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(addr = %metrics_listen, "prometheus exporter listening");
    }

    let tokens = Arc::new(CapabilityTokenService::new(
        config.broker_id.clone(),
        &config.token_secret,
        config.token_ttl,
    ));

    let federation = FederationManager::new(config.clone());
    federation.start();
    let dispatcher = Dispatcher::new(Arc::clone(&federation), Arc::new(KeyStore::new()), tokens);
    let app = presentation::app(dispatcher, Arc::clone(&federation));

    let listener = tokio::net::TcpListener::bind(&cli.listen)
        .await
        .with_context(|| format!("Failed to bind {}", cli.listen))?;
    info!(addr = %cli.listen, broker = %config.broker_id, "mesh broker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Broker server failed")?;

    federation.close().await;
    info!("mesh broker stopped");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<MeshConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            MeshConfig::from_yaml(&raw).context("Failed to parse config file")?
        }
        None => MeshConfig::default(),
    };
    if let Some(broker_id) = &cli.broker_id {
        config.broker_id = broker_id.clone();
    }
    if let Some(secret) = &cli.token_secret {
        config.token_secret = secret.clone();
    }
    Ok(config)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
