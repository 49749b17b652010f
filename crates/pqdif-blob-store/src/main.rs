//! PQDIF Blob Store - persistent tier for the PQDIF file cache
//!
//! Serves the /PQDIF endpoints from a cache directory and passes every
//! other request through to the configured origin.

use pqdif_blob_store::{
    start_server, BlobStore, BlobStoreConfig, BlobStoreError, Result, ServerState, SharedState,
    UpstreamFetcher,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter =
        EnvFilter::from_default_env().add_directive("pqdif_blob_store=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting PQDIF blob store...");

    let config = BlobStoreConfig::from_env();
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    match &config.upstream_url {
        Some(url) => info!("Upstream: {}", url),
        None => info!("Upstream: none (unknown paths answer 404)"),
    }
    info!("Max upload size: {} bytes", config.max_upload_size);

    let upstream = config.upstream_url.as_deref().map(UpstreamFetcher::new);
    let state: SharedState = Arc::new(
        ServerState::new(BlobStore::new(config.cache_dir), upstream)
            .with_max_upload_size(config.max_upload_size),
    );

    // /health answers 503 until the index is rebuilt
    let init_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = init_state.store.init().await {
            error!(error = %e, "Failed to initialize blob store");
        }
    });

    start_server(state, config.port)
        .await
        .map_err(|e| BlobStoreError::Config(format!("Server error: {}", e)))?;

    Ok(())
}
