//! Document intake, status, and administrative endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, ApiResponse};
use crate::workflow::{Actor, SubmitRequest};

/// `POST /api/documents`: register a document and start its review path.
pub async fn submit(
    State(ctx): State<ApiContext>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let outcome = ctx.core.with_workflow(|wf| wf.submit(&req))?;
    Ok((StatusCode::CREATED, ApiResponse::ok(outcome)))
}

/// `GET /api/documents/:id/status`
pub async fn status(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document_id = parse_id(&id, "document")?;
    let view = ctx.core.with_workflow(|wf| wf.get_status(&document_id))?;
    Ok(ApiResponse::ok(view))
}

/// `POST /api/documents/:id/quick-approve`: admin bypass of remaining stages.
pub async fn quick_approve(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document_id = parse_id(&id, "document")?;
    let outcome = ctx.core.with_workflow(|wf| wf.quick_approve(&document_id, &actor))?;
    Ok(ApiResponse::ok(outcome))
}

/// `POST /api/documents/:id/resubmit`: return a rectified document to review.
pub async fn resubmit(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document_id = parse_id(&id, "document")?;
    let outcome = ctx.core.with_workflow(|wf| wf.resubmit(&document_id, &actor))?;
    Ok(ApiResponse::ok(outcome))
}
