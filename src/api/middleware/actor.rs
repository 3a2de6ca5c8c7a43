//! Reviewer role resolution.
//!
//! Reads `X-User-Role` / `X-User-Id` and injects an [`Actor`] into
//! request extensions. Unknown or missing roles are rejected with 403
//! before any workflow state is touched.

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{USER_ID_HEADER, USER_ROLE_HEADER};
use crate::workflow::Actor;

pub async fn require_actor(req: Request<Body>, next: Next) -> Response {
    match require_actor_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_actor_inner(mut req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let actor = {
        let headers = req.headers();
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        Actor::resolve(header(USER_ROLE_HEADER), header(USER_ID_HEADER))?
    };
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}
