//! Idempotency middleware for mutating endpoints.
//!
//! Reads `Idempotency-Key` (falling back to `X-Request-ID`). Requests
//! without either pass straight through. Keys are used byte for byte. The
//! key is registered with the store before the body is read, so concurrent
//! duplicates always coalesce onto one leader. When actor resolution runs
//! first, the caller's role and id are part of the payload fingerprint.

use axum::body::{to_bytes, Body, Bytes};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, IDEMPOTENCY_KEY_HEADER, REPLAYED_HEADER, REQUEST_ID_HEADER};
use crate::idempotency::{fingerprint, CachedResponse, IdempotencyRecord, Lookup};
use crate::workflow::Actor;

/// Largest request or response body buffered for fingerprinting and replay.
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub async fn deduplicate(req: Request<Body>, next: Next) -> Response {
    match deduplicate_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn deduplicate_inner(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let Some(key) = idempotency_key(&req) else {
        return Ok(next.run(req).await);
    };

    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    // Register first, buffer second.
    let lookup = ctx.core.idempotency().check(&key);

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::BadRequest("request body too large or unreadable".into()))?;
    let principal = parts
        .extensions
        .get::<Actor>()
        .map(|actor| format!("{}:{}", actor.role, actor.id.as_deref().unwrap_or_default()))
        .unwrap_or_default();
    let fp = fingerprint(parts.method.as_str(), parts.uri.path(), &principal, &bytes);

    match lookup {
        Lookup::Replay(record) => {
            record.verify(&fp)?;
            tracing::debug!(key = %key, "Replaying cached response");
            Ok(replay(&record))
        }
        Lookup::Wait(waiter) => {
            let record = waiter.wait().await?;
            record.verify(&fp)?;
            tracing::debug!(key = %key, status = record.response.status, "Duplicate served from leader");
            Ok(replay(&record))
        }
        Lookup::Execute(guard) => {
            tracing::debug!(key = guard.key(), "Executing as idempotency leader");
            let req = Request::from_parts(parts, Body::from(bytes));
            let response = next.run(req).await;

            // The guard aborts waiters if buffering fails here.
            let (mut parts, body) = response.into_parts();
            let body = to_bytes(body, MAX_BODY_BYTES)
                .await
                .map_err(|e| ApiError::Internal(format!("response buffering failed: {e}")))?;

            let cached = CachedResponse {
                status: parts.status.as_u16(),
                content_type: parts
                    .headers
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from),
                body: body.to_vec(),
            };
            guard.complete(fp, cached);

            parts.headers.remove(axum::http::header::CONTENT_LENGTH);
            Ok(Response::from_parts(parts, Body::from(body)))
        }
    }
}

fn idempotency_key(req: &Request<Body>) -> Option<String> {
    [IDEMPOTENCY_KEY_HEADER, REQUEST_ID_HEADER]
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
        .map(String::from)
}

fn replay(record: &IdempotencyRecord) -> Response {
    let status = StatusCode::from_u16(record.response.status).unwrap_or(StatusCode::OK);
    let mut response = (status, Bytes::from(record.response.body.clone())).into_response();
    let headers = response.headers_mut();
    if let Some(ct) = record
        .response
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(CONTENT_TYPE, ct);
    }
    headers.insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
    response
}
