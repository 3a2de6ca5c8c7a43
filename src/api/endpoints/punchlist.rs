//! Punchlist listing and rectification.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Extension;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, ApiResponse};
use crate::workflow::Actor;

/// `GET /api/documents/:id/punchlist`: items, most severe first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document_id = parse_id(&id, "document")?;
    let items = ctx.core.with_workflow(|wf| wf.list_punchlist(&document_id))?;
    Ok(ApiResponse::ok(items))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

/// `POST /api/punchlist/:id/complete`: body is optional: `{"notes": "..."}`.
pub async fn complete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let item_id = parse_id(&id, "punchlist item")?;
    let req: CompleteRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CompleteRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))?
    };
    let resolution = ctx
        .core
        .with_workflow(|wf| wf.complete_punchlist(&item_id, req.notes.as_deref(), &actor))?;
    Ok(ApiResponse::ok(resolution))
}
