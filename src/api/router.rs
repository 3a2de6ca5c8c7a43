//! Workflow API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the workflow API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // Per-route layers apply innermost first: actor resolution wraps dedup.
    //
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/documents",
            post(endpoints::documents::submit).layer(from_fn(middleware::idempotency::deduplicate)),
        )
        .route("/documents/:id/status", get(endpoints::documents::status))
        .route(
            "/documents/:id/reviews",
            post(endpoints::reviews::decide)
                .layer(from_fn(middleware::idempotency::deduplicate))
                .layer(from_fn(middleware::actor::require_actor)),
        )
        .route(
            "/documents/:id/quick-approve",
            post(endpoints::documents::quick_approve).layer(from_fn(middleware::actor::require_actor)),
        )
        .route(
            "/documents/:id/resubmit",
            post(endpoints::documents::resubmit).layer(from_fn(middleware::actor::require_actor)),
        )
        .route("/documents/:id/punchlist", get(endpoints::punchlist::list))
        .route(
            "/punchlist/:id/complete",
            post(endpoints::punchlist::complete).layer(from_fn(middleware::actor::require_actor)),
        )
        .route("/reviews/pending", get(endpoints::reviews::pending))
        .route("/reviews/overdue", get(endpoints::reviews::overdue))
        .route("/reviews/stats", get(endpoints::reviews::stats))
        .with_state(ctx.clone())
        .layer(from_fn(middleware::audit::log_access))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx));

    Router::new().nest("/api", routes)
}
