pub mod api; // HTTP adapter
pub mod config;
pub mod core_state; // Transport-agnostic state
pub mod db;
pub mod idempotency; // Request deduplication
pub mod models;
pub mod workflow; // Classification, transitions, SLA

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Open the store, serve the API, and block until Ctrl-C.
pub async fn run(settings: config::Settings) -> Result<(), String> {
    init_tracing();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let core = Arc::new(
        core_state::CoreState::open(&settings).map_err(|e| format!("Cannot open database: {e}"))?,
    );

    let mut server =
        api::start_api_server_on(core, settings.bind_addr, settings.idempotency_sweep_interval)
            .await?;

    tracing::info!(addr = %server.addr, "Ready");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Cannot listen for shutdown signal: {e}"))?;

    server.shutdown();
    server.stopped().await;
    Ok(())
}
