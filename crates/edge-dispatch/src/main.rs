//! Edge Dispatch - main entry point
//!
//! Reads the module artifact once, then serves every HTTP request by
//! forwarding it to the module's handler, activating the module on first use.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use edge_dispatch::gateway::{self, GatewayState};
use edge_dispatch::{AppConfig, Dispatcher, DylibActivator, ModuleArtifact, ModuleLoader};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,edge_dispatch=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Edge Dispatch");

    let config = AppConfig::from_env().context("Invalid configuration")?;
    tracing::info!("Configuration loaded: {:?}", config);

    let artifact = ModuleArtifact::from_path(&config.module_path)
        .await
        .with_context(|| format!("Failed to read module artifact {:?}", config.module_path))?;
    tracing::info!(module = %artifact.name(), size = artifact.len(), "Module artifact loaded");

    let loader = ModuleLoader::new(artifact, DylibActivator::new());
    let dispatcher = Dispatcher::new(Arc::new(loader));

    if config.preload {
        gateway::spawn_warmup(&dispatcher);
    }

    let app = gateway::create_gateway_router(GatewayState {
        dispatcher,
        handler_timeout: config.handler_timeout(),
        max_body_bytes: config.max_body_bytes,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Gateway listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Gateway server exited")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
