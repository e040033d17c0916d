// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::rbac::{PermissionDenied, WorkflowError};
use crate::storage::{DbError, StorageError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            DbError::AlreadyExists(what) => ApiError::conflict(format!("{what} already exists")),
            DbError::Constraint(msg) => ApiError::conflict(msg),
            other => {
                tracing::error!(error = %other, "Database error");
                ApiError::internal("Internal storage error")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidQuery(msg) => ApiError::bad_request(msg),
            other => {
                tracing::error!(error = %other, "Storage error");
                ApiError::internal("Internal storage error")
            }
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Forbidden(msg) => ApiError::forbidden(msg),
            WorkflowError::Validation(msg) => ApiError::bad_request(msg),
            err @ WorkflowError::Permissions(_) => ApiError::bad_request(err.to_string()),
            WorkflowError::NotFound(msg) => ApiError::not_found(msg),
            WorkflowError::Conflict(msg) => ApiError::conflict(msg),
            err @ WorkflowError::LimitReached { .. } => ApiError::conflict(err.to_string()),
            WorkflowError::Db(db) => db.into(),
        }
    }
}

impl From<PermissionDenied> for ApiError {
    fn from(err: PermissionDenied) -> Self {
        ApiError::forbidden(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        assert_eq!(ApiError::bad_request("bad").status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::forbidden("no").status, StatusCode::FORBIDDEN);
        assert_eq!(ApiError::conflict("dup").status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::internal("boom").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn workflow_errors_map_to_statuses() {
        let limit: ApiError = WorkflowError::LimitReached { used: 5, limit: 5 }.into();
        assert_eq!(limit.status, StatusCode::CONFLICT);
        assert!(limit.message.contains("5 of 5"));

        let denied: ApiError = WorkflowError::Forbidden("nope".into()).into();
        assert_eq!(denied.status, StatusCode::FORBIDDEN);

        let missing: ApiError = WorkflowError::Db(DbError::NotFound("Store s1".into())).into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(missing.message, "Store s1 not found");
    }

    #[test]
    fn db_constraint_is_conflict() {
        let err: ApiError = DbError::Constraint("last owner".into()).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }
}
