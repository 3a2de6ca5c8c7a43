//! API server lifecycle: starts/stops the axum HTTP server and the
//! idempotency sweeper that runs alongside it.
//!
//! Pattern: bind, spawn background task, return handle with shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::api::router::api_router;
use crate::core_state::CoreState;

// ═══════════════════════════════════════════════════════════
// Public types
// ═══════════════════════════════════════════════════════════

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    pub started_at: chrono::DateTime<chrono::Utc>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server_task: Option<JoinHandle<()>>,
    sweeper: Option<JoinHandle<()>>,
}

impl ApiServer {
    /// Shut down the server gracefully and stop the sweeper.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }

    /// Wait until the server task has exited.
    pub async fn stopped(&mut self) {
        if let Some(task) = self.server_task.take() {
            if let Err(e) = task.await {
                tracing::error!("API server task failed: {e}");
            }
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ═══════════════════════════════════════════════════════════
// Server lifecycle
// ═══════════════════════════════════════════════════════════

/// Start the API server on `addr` (port 0 picks an ephemeral port).
pub async fn start_api_server_on(
    core: Arc<CoreState>,
    addr: SocketAddr,
    sweep_interval: Duration,
) -> Result<ApiServer, String> {
    // 1. Bind
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind API server: {e}"))?;

    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    tracing::info!(%addr, "API server binding");

    // 2. Expire idempotency records in the background
    let sweeper = core.idempotency().spawn_sweeper(sweep_interval);

    // 3. Build the router
    let app = api_router(core);

    // 4. Set up shutdown signal
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    // 5. Spawn server in background task
    let server_task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        started_at: chrono::Utc::now(),
        shutdown_tx: Some(shutdown_tx),
        server_task: Some(server_task),
        sweeper: Some(sweeper),
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_core() -> Arc<CoreState> {
        Arc::new(CoreState::in_memory().unwrap())
    }

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test]
    async fn start_and_stop_server() {
        let mut server = start_api_server_on(test_core(), localhost(), Duration::from_secs(30))
            .await
            .expect("server should start");
        assert!(server.addr.port() > 0);

        let url = format!("http://{}/api/health", server.addr);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        server.shutdown();
        server.stopped().await;
    }

    #[tokio::test]
    async fn server_serves_workflow_routes() {
        let mut server = start_api_server_on(test_core(), localhost(), Duration::from_secs(30))
            .await
            .expect("server should start");
        let base = format!("http://{}", server.addr);
        let client = reqwest::Client::new();

        // Unknown route returns 404
        let resp = client.get(format!("{base}/nonexistent")).send().await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        let send = || {
            client
                .post(format!("{base}/api/documents"))
                .header("Idempotency-Key", "smoke-1")
                .json(&serde_json::json!({ "site_id": "SBY002", "file_name": "PLN upgrade.pdf" }))
                .send()
        };
        let first = send().await.unwrap();
        assert_eq!(first.status(), reqwest::StatusCode::CREATED);
        let first: serde_json::Value = first.json().await.unwrap();
        assert_eq!(first["data"]["atp_code"], "ATP-SBY002-001");
        assert_eq!(first["data"]["category"], "PLN_UPGRADE");

        let second = send().await.unwrap();
        assert_eq!(second.headers()["Idempotent-Replayed"], "true");
        let second: serde_json::Value = second.json().await.unwrap();
        assert_eq!(first, second);

        server.shutdown();
        server.stopped().await;
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let server = start_api_server_on(test_core(), localhost(), Duration::from_secs(30))
            .await
            .unwrap();
        let err = start_api_server_on(test_core(), server.addr, Duration::from_secs(30))
            .await
            .err()
            .unwrap();
        assert!(err.contains("Failed to bind"));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let mut server = start_api_server_on(test_core(), localhost(), Duration::from_secs(30))
            .await
            .expect("server should start");
        server.shutdown();
        server.shutdown(); // Second call should be safe
        server.stopped().await;
    }
}
