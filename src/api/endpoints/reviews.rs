//! Review decisions and reviewer queues.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{parse_id, ApiContext, ApiResponse};
use crate::models::enums::Role;
use crate::workflow::{Actor, ReviewRequest};

/// `POST /api/documents/:id/reviews`: record a decision on the pending stage.
pub async fn decide(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let document_id = parse_id(&id, "document")?;
    let Json(req) = payload?;
    let outcome = ctx.core.with_workflow(|wf| wf.review(&document_id, &req, &actor))?;
    Ok(ApiResponse::ok(outcome))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub role: Option<String>,
}

/// `GET /api/reviews/pending?role=`: a reviewer's queue, most urgent first.
pub async fn pending(
    State(ctx): State<ApiContext>,
    Query(query): Query<PendingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let raw = query.role.unwrap_or_default();
    let role = Role::parse_acting(&raw)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown or missing role: '{raw}'")))?;
    let reviews = ctx.core.with_workflow(|wf| wf.pending_reviews(role))?;
    Ok(ApiResponse::ok(reviews))
}

/// `GET /api/reviews/overdue`: every pending stage past its deadline.
pub async fn overdue(State(ctx): State<ApiContext>) -> Result<impl IntoResponse, ApiError> {
    let overdue = ctx.core.with_workflow(|wf| wf.overdue_stages())?;
    Ok(ApiResponse::ok(overdue))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub role: Option<String>,
    pub reviewer_id: Option<String>,
}

/// `GET /api/reviews/stats?role=&reviewer_id=`: dashboard counters.
pub async fn stats(
    State(ctx): State<ApiContext>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let role = match query.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => Some(
            Role::parse_acting(raw).ok_or_else(|| ApiError::BadRequest(format!("Unknown role: '{raw}'")))?,
        ),
        None => None,
    };
    let stats = ctx
        .core
        .with_workflow(|wf| wf.review_stats(role, query.reviewer_id.as_deref()))?;
    Ok(ApiResponse::ok(stats))
}
