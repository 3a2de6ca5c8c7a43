//! API error types with structured JSON responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::core_state::CoreError;
use crate::idempotency::IdempotencyError;
use crate::workflow::WorkflowError;

/// Structured error body: `{success: false, error, code, details?}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Forbidden: role {role} (requires {required})")]
    Forbidden { role: String, required: String },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Idempotency key reused with a different payload")]
    IdempotencyKeyReused,
    #[error("Original request for this idempotency key was aborted")]
    RequestAborted,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", detail, None),
            ApiError::Forbidden { role, required } => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                format!("Role {role} is not allowed to perform this action"),
                Some(json!({ "role": role, "required": required })),
            ),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail, None),
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail, None),
            ApiError::IdempotencyKeyReused => (
                StatusCode::CONFLICT,
                "IDEMPOTENCY_KEY_REUSED",
                "Idempotency key was already used with a different payload".to_string(),
                None,
            ),
            ApiError::RequestAborted => (
                StatusCode::SERVICE_UNAVAILABLE,
                "IDEMPOTENT_REQUEST_ABORTED",
                "The original request for this idempotency key was aborted; retry".to_string(),
                None,
            ),
            ApiError::Unavailable(detail) => {
                tracing::error!(detail, "API dependency failure");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Storage is temporarily unavailable".to_string(),
                    None,
                )
            }
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            success: false,
            error: message,
            code,
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => ApiError::BadRequest(msg),
            WorkflowError::Unauthorized { role, required } => ApiError::Forbidden { role, required },
            WorkflowError::NotFound { entity, id } => ApiError::NotFound(format!("{entity} {id} not found")),
            WorkflowError::Conflict(msg) => ApiError::Conflict(msg),
            WorkflowError::Dependency(e) => ApiError::Unavailable(e.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::LockPoisoned => ApiError::Internal("lock poisoned".into()),
            CoreError::Database(e) => ApiError::Unavailable(e.to_string()),
            CoreError::Workflow(e) => e.into(),
        }
    }
}

impl From<IdempotencyError> for ApiError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::Aborted => ApiError::RequestAborted,
            IdempotencyError::PayloadMismatch => ApiError::IdempotencyKeyReused,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use crate::db::DatabaseError;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn validation_returns_400() {
        let response = ApiError::from(WorkflowError::Validation("decision is required".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["error"], "decision is required");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn unauthorized_role_returns_403_with_details() {
        let err = WorkflowError::Unauthorized {
            role: "RTH".into(),
            required: "FOP_RTS".into(),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let json = body_json(response).await;
        assert_eq!(json["details"]["required"], "FOP_RTS");
    }

    #[tokio::test]
    async fn not_found_and_conflict() {
        let nf = ApiError::from(WorkflowError::NotFound {
            entity: "Document",
            id: "x".into(),
        })
        .into_response();
        assert_eq!(nf.status(), StatusCode::NOT_FOUND);

        let conflict = ApiError::from(WorkflowError::Conflict("stage 1 already has a decision".into())).into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn dependency_returns_503_without_leaking() {
        let err = WorkflowError::Dependency(DatabaseError::ConstraintViolation("disk full".into()));
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert!(!json["error"].as_str().unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn internal_returns_500_generic_message() {
        let response = ApiError::Internal("something broke".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"], "An internal error occurred");
    }

    #[tokio::test]
    async fn idempotency_errors_map() {
        let aborted = ApiError::from(IdempotencyError::Aborted).into_response();
        assert_eq!(aborted.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(aborted).await["code"], "IDEMPOTENT_REQUEST_ABORTED");

        let reused = ApiError::from(IdempotencyError::PayloadMismatch).into_response();
        assert_eq!(reused.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn core_lock_poisoned_is_internal() {
        let response = ApiError::from(CoreError::LockPoisoned).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
