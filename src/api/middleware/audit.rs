//! Access logging middleware.
//!
//! Logs every API request with method, path, claimed role, response
//! status and latency. Runs outside the per-route layers so rejected
//! requests are logged too.

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::USER_ROLE_HEADER;

pub async fn log_access(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let role = req
        .headers()
        .get(USER_ROLE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = started.elapsed().as_millis() as u64;
    if response.status().is_server_error() {
        tracing::warn!(%method, %path, %role, status, latency_ms, "API request failed");
    } else {
        tracing::info!(%method, %path, %role, status, latency_ms, "API request");
    }

    response
}
