pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod models;
pub mod pipeline;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Start the analysis service and serve until Ctrl+C.
pub async fn run() -> Result<(), String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::AppConfig::from_env();
    let bind = config.bind;

    let core = tokio::task::spawn_blocking(move || core_state::CoreState::from_config(config))
        .await
        .map_err(|e| format!("Startup task failed: {e}"))?
        .map_err(|e| e.to_string())?;

    let mut server = api::start_server(Arc::new(core), bind).await?;
    tracing::info!(addr = %server.session.server_addr, "Ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Cannot listen for Ctrl+C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}
