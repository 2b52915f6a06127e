// Main entry point for the lead discovery API server

use std::sync::Arc;

use anyhow::{Context, Result};
use lead_discovery::{DiscoveryPipeline, MemoryStore};
use server_core::{server::build_app, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,lead_discovery=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Lead Discovery API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    let settings = config
        .pipeline_settings()
        .context("Invalid discovery settings")?;
    tracing::info!("Configuration loaded");

    // Seed the store
    let configurations = config.load_configurations()?;
    tracing::info!(count = configurations.len(), "Configurations loaded");
    let store = Arc::new(MemoryStore::from_configurations(configurations.clone()));

    // Build and start the pipeline
    let pipeline = DiscoveryPipeline::builder(store.clone(), store)
        .settings(settings)
        .build()
        .await
        .context("Failed to build discovery pipeline")?;
    pipeline
        .start()
        .await
        .context("Failed to start discovery scheduler")?;
    pipeline.schedule_all(configurations).await;
    let pipeline = Arc::new(pipeline);

    // Build application
    let app = build_app(pipeline.clone(), &config.allowed_origins);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Drain the pipeline after the listener closes
    tracing::info!("Shutting down discovery pipeline");
    pipeline
        .shutdown()
        .await
        .context("Failed to stop discovery scheduler")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
