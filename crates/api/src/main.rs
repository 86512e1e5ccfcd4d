use anyhow::{Context, Result};

use api::{AppConfig, AppState, Metrics, logging, router};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let config = AppConfig::from_env()?;
    let max_upload_bytes = config.max_upload_bytes;

    let adapter = extract::build_adapter(config.pipeline.clone(), &config.remote)
        .context("Failed to build extraction client")?;

    if config.remote_configured() {
        tracing::info!(model = %config.remote.model, "Remote extraction enabled");
    } else {
        tracing::warn!("EXTRACT_API_KEY not set; all documents will use the fallback extractor");
    }

    let state = AppState {
        adapter,
        credential: config.api_key.clone(),
        metrics: Metrics::new(),
    };
    let app = router(state, max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!("Server listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
